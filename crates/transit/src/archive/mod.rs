//! Byte-archive reader.
//!
//! Extracts named entries from a compressed archive held entirely in memory.
//! Only stored and deflate entries are understood; anything else is a hard
//! error rather than a skipped entry.

pub mod cursor;
pub mod reader;

use std::collections::BTreeMap;

pub use reader::{inflate_raw, ArchiveReader, CompressionMethod, LocalEntry};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Bad header signature {found:#010x} at offset {offset}")]
    BadSignature { offset: usize, found: u32 },

    #[error("Unsupported compression method {method} for entry {name}")]
    UnsupportedMethod { name: String, method: u16 },

    #[error("Entry not found: {name}")]
    EntryNotFound { name: String },

    #[error("Archive contains no entries")]
    Empty,

    #[error("Archive truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Cannot determine the size of stored entry {name}")]
    UnresolvableSize { name: String },

    #[error("Inflate failed: {0}")]
    Inflate(String),
}

/// Iterate over every local entry in the archive.
pub fn entries(archive: &[u8]) -> ArchiveReader<'_> {
    ArchiveReader::new(archive)
}

pub fn entry_names(archive: &[u8]) -> Result<Vec<String>, ArchiveError> {
    entries(archive)
        .map(|entry| entry.map(|e| e.name))
        .collect()
}

/// Decompressed bytes of the entry called `name`.
///
/// An archive without a single entry reports `Empty`; an archive that has
/// entries but not this one reports `EntryNotFound`.
pub fn extract_entry(archive: &[u8], name: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut seen = 0usize;
    for entry in entries(archive) {
        let entry = entry?;
        seen += 1;
        if entry.matches(name) {
            tracing::debug!("extracting archive entry {} ({:?})", entry.name, entry.method);
            return entry.decompress();
        }
    }

    if seen == 0 {
        Err(ArchiveError::Empty)
    } else {
        Err(ArchiveError::EntryNotFound {
            name: name.to_string(),
        })
    }
}

/// Like [`extract_entry`], decoded as UTF-8 (lossily).
pub fn extract_text(archive: &[u8], name: &str) -> Result<String, ArchiveError> {
    extract_entry(archive, name).map(bytes_to_text)
}

/// Name and contents of the first entry, for single-file archives.
pub fn first_entry(archive: &[u8]) -> Result<(String, Vec<u8>), ArchiveError> {
    match entries(archive).next() {
        Some(entry) => {
            let entry = entry?;
            let name = entry.name.clone();
            Ok((name, entry.decompress()?))
        }
        None => Err(ArchiveError::Empty),
    }
}

/// Extract several entries in one scan, keyed by the requested name.
///
/// Requested names that are absent are simply missing from the result.
pub fn extract_many(
    archive: &[u8],
    wanted: &[&str],
) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut found = BTreeMap::new();
    let mut seen = 0usize;

    for entry in entries(archive) {
        let entry = entry?;
        seen += 1;
        let Some(&requested) = wanted
            .iter()
            .find(|w| entry.matches(w) && !found.contains_key(**w))
        else {
            continue;
        };
        found.insert(requested.to_string(), entry.decompress()?);
        if found.len() == wanted.len() {
            break;
        }
    }

    if seen == 0 {
        return Err(ArchiveError::Empty);
    }
    Ok(found)
}

pub fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

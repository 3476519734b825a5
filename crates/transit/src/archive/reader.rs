//! Sequential scan over local entry headers.
//!
//! The central directory is never consulted: entries are discovered by
//! walking local headers from the start of the buffer until a central
//! directory (or end of central directory) signature is reached.

use flate2::{Decompress, FlushDecompress, Status};

use super::cursor::ByteCursor;
use super::ArchiveError;

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// Sizes live in a trailing data descriptor instead of the local header
const FLAG_DEFERRED_SIZES: u16 = 0x0008;

/// crc32 + compressed size + uncompressed size
const DESCRIPTOR_LEN: usize = 12;

const INFLATE_CHUNK: usize = 32 * 1024;

/// Upper bound on DEFLATE expansion per input byte
const MAX_DEFLATE_RATIO: usize = 1032;

/// Ceiling on the up-front allocation; output beyond it grows on demand
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
}

impl CompressionMethod {
    fn from_raw(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Stored),
            8 => Some(Self::Deflate),
            _ => None,
        }
    }
}

/// One local entry with its data region resolved.
#[derive(Debug)]
pub struct LocalEntry<'a> {
    pub name: String,
    pub method: CompressionMethod,
    pub header_offset: usize,
    pub deferred_sizes: bool,
    data: &'a [u8],
    /// Output already produced while measuring a deferred deflate stream
    inflated: Option<Vec<u8>>,
    uncompressed_size: usize,
}

impl<'a> LocalEntry<'a> {
    /// Compressed bytes as stored in the archive
    pub fn raw_data(&self) -> &'a [u8] {
        self.data
    }

    /// Entry name matches either exactly or as the last path component.
    pub fn matches(&self, wanted: &str) -> bool {
        self.name == wanted
            || self
                .name
                .rsplit_once('/')
                .map(|(_, base)| base == wanted)
                .unwrap_or(false)
    }

    pub fn decompress(self) -> Result<Vec<u8>, ArchiveError> {
        if let Some(bytes) = self.inflated {
            return Ok(bytes);
        }
        match self.method {
            CompressionMethod::Stored => Ok(self.data.to_vec()),
            CompressionMethod::Deflate => {
                let (bytes, _) = inflate_raw(self.data, self.uncompressed_size)?;
                Ok(bytes)
            }
        }
    }
}

/// Iterator over the local entries of an archive buffer.
///
/// Yields at most one error, after which iteration stops.
pub struct ArchiveReader<'a> {
    cursor: ByteCursor<'a>,
    finished: bool,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(bytes),
            finished: false,
        }
    }

    fn read_entry(&mut self) -> Result<Option<LocalEntry<'a>>, ArchiveError> {
        if self.cursor.is_at_end() {
            return Ok(None);
        }

        let header_offset = self.cursor.position();
        let signature = self.cursor.read_u32()?;
        match signature {
            LOCAL_HEADER_SIGNATURE => {}
            CENTRAL_HEADER_SIGNATURE | END_OF_CENTRAL_DIRECTORY_SIGNATURE => return Ok(None),
            found => {
                return Err(ArchiveError::BadSignature {
                    offset: header_offset,
                    found,
                })
            }
        }

        let _version = self.cursor.read_u16()?;
        let flags = self.cursor.read_u16()?;
        let raw_method = self.cursor.read_u16()?;
        let _mod_time = self.cursor.read_u16()?;
        let _mod_date = self.cursor.read_u16()?;
        let _crc = self.cursor.read_u32()?;
        let compressed_size = self.cursor.read_u32()? as usize;
        let uncompressed_size = self.cursor.read_u32()? as usize;
        let name_len = self.cursor.read_u16()? as usize;
        let extra_len = self.cursor.read_u16()? as usize;

        let name = String::from_utf8_lossy(self.cursor.take(name_len)?).into_owned();
        self.cursor.skip(extra_len)?;

        let method = CompressionMethod::from_raw(raw_method).ok_or_else(|| {
            ArchiveError::UnsupportedMethod {
                name: name.clone(),
                method: raw_method,
            }
        })?;

        let deferred_sizes = flags & FLAG_DEFERRED_SIZES != 0;
        let mut inflated = None;

        let data = if deferred_sizes && compressed_size == 0 {
            match method {
                CompressionMethod::Deflate => {
                    let (bytes, consumed) = inflate_raw(self.cursor.rest(), uncompressed_size)?;
                    inflated = Some(bytes);
                    self.cursor.take(consumed)?
                }
                CompressionMethod::Stored => {
                    let len = find_stored_len(self.cursor.rest()).ok_or_else(|| {
                        ArchiveError::UnresolvableSize { name: name.clone() }
                    })?;
                    self.cursor.take(len)?
                }
            }
        } else {
            self.cursor.take(compressed_size)?
        };

        if deferred_sizes {
            self.skip_descriptor()?;
        }

        tracing::trace!(
            "archive entry {} at {} ({:?}, {} bytes)",
            name,
            header_offset,
            method,
            data.len()
        );

        Ok(Some(LocalEntry {
            name,
            method,
            header_offset,
            deferred_sizes,
            data,
            inflated,
            uncompressed_size,
        }))
    }

    /// The descriptor may or may not carry its own signature.
    fn skip_descriptor(&mut self) -> Result<(), ArchiveError> {
        if self.cursor.peek_u32() == Some(DATA_DESCRIPTOR_SIGNATURE) {
            self.cursor.skip(4)?;
        }
        self.cursor.skip(DESCRIPTOR_LEN)
    }
}

impl<'a> Iterator for ArchiveReader<'a> {
    type Item = Result<LocalEntry<'a>, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Length of a stored entry whose size only appears in its descriptor.
///
/// Looks for a signed descriptor whose recorded compressed size equals its
/// own distance from the start of the data.
fn find_stored_len(rest: &[u8]) -> Option<usize> {
    let signature = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
    let mut start = 0;
    while start + 4 + DESCRIPTOR_LEN <= rest.len() {
        let window = &rest[start..];
        let found = window.windows(4).position(|w| w == signature)?;
        let at = start + found;
        if at + 4 + DESCRIPTOR_LEN > rest.len() {
            return None;
        }
        let size_bytes = &rest[at + 8..at + 12];
        let recorded = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);
        if recorded as usize == at {
            return Some(at);
        }
        start = at + 1;
    }
    None
}

/// Inflate a raw DEFLATE stream (no zlib header).
///
/// Returns the output and the number of input bytes the stream occupied.
pub fn inflate_raw(input: &[u8], size_hint: usize) -> Result<(Vec<u8>, usize), ArchiveError> {
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity(initial_capacity(input.len(), size_hint));

    loop {
        if out.len() == out.capacity() {
            out.reserve(INFLATE_CHUNK);
        }

        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let status = inflater
            .decompress_vec(&input[before_in as usize..], &mut out, FlushDecompress::None)
            .map_err(|e| ArchiveError::Inflate(e.to_string()))?;

        if status == Status::StreamEnd {
            break;
        }

        let stalled = inflater.total_in() == before_in && inflater.total_out() == before_out;
        if stalled && out.len() < out.capacity() {
            return Err(ArchiveError::Inflate(
                "deflate stream ended before its final block".to_string(),
            ));
        }
    }

    Ok((out, inflater.total_in() as usize))
}

/// Header sizes are untrusted; never reserve more than the input could inflate to.
fn initial_capacity(input_len: usize, size_hint: usize) -> usize {
    size_hint
        .min(input_len.saturating_mul(MAX_DEFLATE_RATIO))
        .min(MAX_PREALLOCATION)
        .max(INFLATE_CHUNK)
}

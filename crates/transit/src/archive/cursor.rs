//! Little-endian cursor over an in-memory archive.
//!
//! Every read either advances by exactly the bytes it consumed or fails with
//! `ArchiveError::Truncated` carrying the offset it was attempted at.

use std::io::{self, Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::ArchiveError;

pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }

    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u16(&mut self) -> Result<u16, ArchiveError> {
        let offset = self.position();
        self.inner
            .read_u16::<LittleEndian>()
            .map_err(|e| truncated(offset, e))
    }

    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        let offset = self.position();
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(offset, e))
    }

    /// Read a u32 without advancing. `None` if fewer than 4 bytes remain.
    pub fn peek_u32(&self) -> Option<u32> {
        let rest = self.rest();
        if rest.len() < 4 {
            return None;
        }
        let mut probe = Cursor::new(rest);
        probe.read_u32::<LittleEndian>().ok()
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        let offset = self.position();
        if len > self.remaining() {
            return Err(ArchiveError::Truncated { offset });
        }
        let bytes: &'a [u8] = *self.inner.get_ref();
        self.skip(len)?;
        Ok(&bytes[offset..offset + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ArchiveError> {
        let offset = self.position();
        if len > self.remaining() {
            return Err(ArchiveError::Truncated { offset });
        }
        self.inner
            .seek(SeekFrom::Current(len as i64))
            .map_err(|e| truncated(offset, e))?;
        Ok(())
    }

    /// Everything after the current position, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        let bytes: &'a [u8] = *self.inner.get_ref();
        &bytes[self.position().min(bytes.len())..]
    }
}

fn truncated(offset: usize, _source: io::Error) -> ArchiveError {
    ArchiveError::Truncated { offset }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian_and_advances() {
        let bytes = [0x50, 0x4b, 0x03, 0x04, 0x14, 0x00];
        let mut cursor = ByteCursor::new(&bytes);

        assert_eq!(cursor.peek_u32(), Some(0x04034b50));
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.read_u32().unwrap(), 0x04034b50);
        assert_eq!(cursor.read_u16().unwrap(), 20);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_take_and_skip_bounds() {
        let bytes = [1, 2, 3, 4, 5];
        let mut cursor = ByteCursor::new(&bytes);

        assert_eq!(cursor.take(2).unwrap(), &[1, 2]);
        cursor.skip(1).unwrap();
        assert_eq!(cursor.rest(), &[4, 5]);

        match cursor.take(3) {
            Err(ArchiveError::Truncated { offset }) => assert_eq!(offset, 3),
            other => panic!("expected truncation, got {:?}", other),
        }
        // A failed take leaves the cursor where it was
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn test_short_reads_are_truncation() {
        let bytes = [0x01];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(cursor.peek_u32(), None);
        assert!(matches!(
            cursor.read_u16(),
            Err(ArchiveError::Truncated { offset: 0 })
        ));
    }
}

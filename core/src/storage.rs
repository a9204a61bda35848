// Positional access to a volume's backing storage
// Anything seekable, readable and writable (files, in-memory cursors) qualifies

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Largest zero buffer written in one go when clearing a range
const ZERO_CHUNK: usize = 64 * 1024;

/// Positional helpers over a `Read + Write + Seek` stream.
///
/// Every call seeks first, so callers never depend on the stream position
/// left behind by a previous operation.
pub trait Storage: Read + Write + Seek {
    /// Total length of the backing storage in bytes
    fn storage_len(&mut self) -> io::Result<u64> {
        let current = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    /// Fill `buf` from `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    /// Write all of `buf` at `offset`, extending the storage if needed
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }

    /// Overwrite `len` bytes at `offset` with zeroes
    fn zero_range(&mut self, offset: u64, len: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        let zeros = vec![0u8; (len as usize).min(ZERO_CHUNK)];
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            self.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(())
    }
}

impl<T: Read + Write + Seek + ?Sized> Storage for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_len_preserves_position() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        cursor.seek(SeekFrom::Start(17)).unwrap();
        assert_eq!(cursor.storage_len().unwrap(), 100);
        assert_eq!(cursor.stream_position().unwrap(), 17);
    }

    #[test]
    fn test_positional_read_write() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        cursor.write_at(4, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 5];
        cursor.read_at(3, &mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_zero_range() {
        let mut cursor = Cursor::new(vec![0xAAu8; 8]);
        cursor.zero_range(2, 4).unwrap();
        assert_eq!(cursor.into_inner(), vec![0xAA, 0xAA, 0, 0, 0, 0, 0xAA, 0xAA]);
    }
}

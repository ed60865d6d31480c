//! Bounds-checked sequential reader.
//!
//! All multi-byte integers are little-endian. A read that needs more bytes
//! than remain fails with [`Error::Underflow`] and leaves the cursor where it
//! was.

use crate::error::{Error, Result};

/// Sequential little-endian reader over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct FieldCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FieldCursor<'a> {
    /// Creates a cursor positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns true once every byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes `count` bytes and returns them
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(Error::underflow(self.position, count, remaining));
        }
        let start = self.position;
        self.position += count;
        Ok(&self.data[start..self.position])
    }

    /// Consumes `count` bytes without inspecting them
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads one unsigned byte
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    /// Reads one signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_array::<1>().map(i8::from_le_bytes)
    }

    /// Reads an unsigned 16-bit integer
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a signed 16-bit integer
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    /// Reads an unsigned 32-bit integer
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a signed 32-bit integer
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [
            0x01, // u8
            0xFF, // i8
            0x34, 0x12, // u16
            0xFE, 0xFF, // i16
            0x78, 0x56, 0x34, 0x12, // u32
            0xFF, 0xFF, 0xFF, 0xFF, // i32
        ];
        let mut cursor = FieldCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_i8().unwrap(), -1);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(cursor.read_i32().unwrap(), -1);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_skip_and_read_bytes() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut cursor = FieldCursor::new(&data);
        cursor.skip(2).unwrap();
        assert_eq!(cursor.read_bytes(3).unwrap(), &[3, 4, 5]);
        assert_eq!(cursor.position(), 5);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_underflow_does_not_advance() {
        let data = [0xAA, 0xBB, 0xCC];
        let mut cursor = FieldCursor::new(&data);
        cursor.skip(1).unwrap();

        let err = cursor.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Error::Underflow {
                offset: 1,
                requested: 4,
                remaining: 2
            }
        ));
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0xCCBB);
    }

    #[test]
    fn test_empty_buffer() {
        let mut cursor = FieldCursor::new(&[]);
        assert!(cursor.read_u8().is_err());
        assert!(cursor.skip(1).is_err());
        assert!(cursor.skip(0).is_ok());
    }

    #[test]
    fn test_oversized_skip() {
        let data = [0u8; 8];
        let mut cursor = FieldCursor::new(&data);
        assert!(matches!(
            cursor.skip(10),
            Err(Error::Underflow { requested: 10, .. })
        ));
    }
}

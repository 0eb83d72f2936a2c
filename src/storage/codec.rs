//! Big-endian binary codec
//!
//! Every on-disk structure (bitmap headers, page files, vector payloads) is
//! written through [`ByteWriter`] and read back through [`ByteReader`].
//!
//! ```text
//! u16/u32/u64/i32/i64   fixed width, big-endian
//! bytes                 raw, caller knows the length
//! string                u16 byte length + UTF-8 bytes
//! ```

use crate::storage::error::{StorageError, StorageResult};

/// Growable output buffer
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a u16 length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> StorageResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| {
            StorageError::Capacity(format!(
                "string of {} bytes does not fit a u16 length prefix",
                value.len()
            ))
        })?;
        self.write_u16(len);
        self.write_bytes(value.as_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> StorageResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u16(&mut self) -> StorageResult<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> StorageResult<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn read_u64(&mut self) -> StorageResult<u64> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    pub fn read_i32(&mut self) -> StorageResult<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn read_i64(&mut self) -> StorageResult<i64> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(StorageError::Corruption(format!(
                "needed {} bytes at offset {}, only {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a u16 length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> StorageResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StorageError::Corruption(format!("invalid UTF-8 string: {}", e)))
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut w = ByteWriter::new();
        w.write_u16(0x0102);
        w.write_u32(0x0304_0506);
        w.write_i32(-1);
        assert_eq!(
            w.as_slice(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_mixed_values_read_back() {
        let mut w = ByteWriter::new();
        w.write_u64(u64::MAX - 7);
        w.write_i64(i64::MIN);
        w.write_string("löwe").unwrap();
        w.write_bytes(&[9, 8, 7]);

        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 7);
        assert_eq!(r.read_i64().unwrap(), i64::MIN);
        assert_eq!(r.read_string().unwrap(), "löwe");
        assert_eq!(r.read_bytes(3).unwrap(), &[9, 8, 7]);
        assert!(!r.has_remaining());
    }

    #[test]
    fn test_truncated_input_is_corruption() {
        let mut r = ByteReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(r.read_u16().unwrap(), 1);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
        // Failed read does not advance
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn test_string_too_long() {
        let long = "x".repeat(u16::MAX as usize + 1);
        let mut w = ByteWriter::new();
        assert!(matches!(
            w.write_string(&long),
            Err(StorageError::Capacity(_))
        ));
        assert!(w.is_empty());
    }
}

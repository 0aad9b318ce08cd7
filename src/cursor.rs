use crate::error::{DecodeError, Result};
use byteorder::{BigEndian, ByteOrder};

/// Bounds-checked big-endian reader over an immutable byte buffer.
///
/// All accessors take an absolute offset into the buffer and never wrap:
/// an `offset + len` that overflows is reported as
/// [`DecodeError::MalformedLength`], one that runs past the end as
/// [`DecodeError::OutOfBounds`].
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub const fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes available from `offset` to the end of the buffer (0 past the end).
    pub fn remaining(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(DecodeError::MalformedLength)?;
        self.data.get(offset..end).ok_or(DecodeError::OutOfBounds {
            offset,
            len,
            available: self.data.len(),
        })
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(offset, 2)?))
    }

    pub fn read_i16(&self, offset: usize) -> Result<i16> {
        Ok(BigEndian::read_i16(self.read_bytes(offset, 2)?))
    }

    pub fn read_u24(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read_bytes(offset, 3)?))
    }

    pub fn read_i24(&self, offset: usize) -> Result<i32> {
        Ok(BigEndian::read_i24(self.read_bytes(offset, 3)?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(offset, 4)?))
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        Ok(BigEndian::read_i32(self.read_bytes(offset, 4)?))
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        Ok(BigEndian::read_u64(self.read_bytes(offset, 8)?))
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        Ok(BigEndian::read_i64(self.read_bytes(offset, 8)?))
    }

    pub fn read_f64(&self, offset: usize) -> Result<f64> {
        Ok(BigEndian::read_f64(self.read_bytes(offset, 8)?))
    }

    pub fn read_fourcc(&self, offset: usize) -> Result<[u8; 4]> {
        let b = self.read_bytes(offset, 4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}

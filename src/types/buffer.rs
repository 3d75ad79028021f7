//! A cursor over a fixed byte region.
//!
//! `PositionedBuffer` is the unit every codec reads from and writes into. It
//! exposes only the window `[offset, offset + length)` of its backing bytes;
//! codecs see positions relative to `offset`.
//!
//! The backing is either an owned `Vec<u8>` or a shared [`Bytes`] handle.
//! Wrapping `Bytes` does not copy; the first write through a shared buffer
//! copies the backing into an owned one.

use crate::error::{Error, Result};
use bytes::Bytes;

#[derive(Debug, Clone)]
enum Backing {
    Owned(Vec<u8>),
    Shared(Bytes),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Owned(bytes) => bytes,
            Backing::Shared(bytes) => bytes,
        }
    }

    fn make_mut(&mut self) -> &mut [u8] {
        match self {
            Backing::Owned(bytes) => bytes,
            Backing::Shared(shared) => {
                *self = Backing::Owned(shared.to_vec());
                self.make_mut()
            }
        }
    }
}

impl PartialEq for Backing {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Backing {}

/// A byte window with a mutable read/write position.
///
/// Invariant: `position <= length` and `offset + length <= backing.len()`.
/// Every successful read or write advances `position` by exactly the number
/// of bytes it touched; a failed one leaves `position` where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedBuffer {
    bytes: Backing,
    offset: usize,
    length: usize,
    position: usize,
}

impl PositionedBuffer {
    /// Create a zero-filled buffer of `capacity` bytes positioned at 0.
    pub fn new(capacity: usize) -> Self {
        Self::wrap(vec![0u8; capacity])
    }

    /// Wrap existing bytes; the window covers all of them.
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let length = bytes.len();
        Self { bytes: Backing::Owned(bytes), offset: 0, length, position: 0 }
    }

    /// Wrap shared bytes without copying them.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let length = bytes.len();
        Self { bytes: Backing::Shared(bytes), offset: 0, length, position: 0 }
    }

    /// Copy `data` into a new buffer positioned at 0.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::wrap(data.to_vec())
    }

    /// Wrap existing bytes, exposing only `[offset, offset + length)`.
    pub fn with_range(bytes: Vec<u8>, offset: usize, length: usize) -> Result<Self> {
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::invalid_argument("buffer range overflows usize"))?;
        if end > bytes.len() {
            return Err(Error::invalid_argument(format!(
                "range [{}, {}) exceeds backing length {}",
                offset,
                end,
                bytes.len()
            )));
        }
        Ok(Self { bytes: Backing::Owned(bytes), offset, length, position: 0 })
    }

    /// Offset of the window within the backing bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the window.
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if the window is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current position relative to `offset`.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Positions past the window are rejected.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.length {
            return Err(Error::invalid_argument(format!(
                "position {} past buffer length {}",
                position, self.length
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Bytes between the cursor and the end of the window.
    pub fn remaining(&self) -> usize {
        self.length - self.position
    }

    /// True if at least one byte is left.
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    fn check_read(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::BufferUnderflow { requested: n, remaining: self.remaining() });
        }
        Ok(())
    }

    fn check_write(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::BufferOverflow { requested: n, remaining: self.remaining() });
        }
        Ok(())
    }

    /// Absolute index of the cursor in the backing bytes.
    fn cursor(&self) -> usize {
        self.offset + self.position
    }

    /// Read the byte under the cursor without advancing.
    pub fn peek(&self) -> Result<u8> {
        self.check_read(1)?;
        Ok(self.bytes.as_slice()[self.cursor()])
    }

    /// Read one byte and advance.
    pub fn get(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.position += 1;
        Ok(b)
    }

    /// Fill `dst` from the cursor and advance by `dst.len()`.
    pub fn get_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_read(dst.len())?;
        let start = self.cursor();
        dst.copy_from_slice(&self.bytes.as_slice()[start..start + dst.len()]);
        self.position += dst.len();
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn get_slice(&mut self, n: usize) -> Result<&[u8]> {
        self.check_read(n)?;
        let start = self.cursor();
        self.position += n;
        Ok(&self.bytes.as_slice()[start..start + n])
    }

    /// Read a big-endian `u32`.
    pub fn get_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.get_into(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian `u64`.
    pub fn get_u64_be(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.get_into(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Write one byte and advance.
    pub fn put(&mut self, b: u8) -> Result<()> {
        self.check_write(1)?;
        let at = self.cursor();
        self.bytes.make_mut()[at] = b;
        self.position += 1;
        Ok(())
    }

    /// Write all of `src` and advance by `src.len()`.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.check_write(src.len())?;
        let start = self.cursor();
        self.bytes.make_mut()[start..start + src.len()].copy_from_slice(src);
        self.position += src.len();
        Ok(())
    }

    /// Write a big-endian `u32`.
    pub fn put_u32_be(&mut self, v: u32) -> Result<()> {
        self.put_slice(&v.to_be_bytes())
    }

    /// Write a big-endian `u64`.
    pub fn put_u64_be(&mut self, v: u64) -> Result<()> {
        self.put_slice(&v.to_be_bytes())
    }

    /// Mutable view of the `n` bytes ending at the cursor.
    ///
    /// Codecs use this to post-process what they just wrote (for example to
    /// apply a descending sort order) without re-reading through the cursor.
    pub(crate) fn last_written_mut(&mut self, n: usize) -> &mut [u8] {
        let end = self.cursor();
        &mut self.bytes.make_mut()[end - n..end]
    }

    /// The whole window, independent of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes.as_slice()[self.offset..self.offset + self.length]
    }

    /// The part of the window before the cursor.
    pub fn written(&self) -> &[u8] {
        &self.bytes.as_slice()[self.offset..self.cursor()]
    }

    /// Give back the backing bytes, including anything outside the window.
    pub fn into_inner(self) -> Vec<u8> {
        match self.bytes {
            Backing::Owned(bytes) => bytes,
            Backing::Shared(bytes) => bytes.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_positioned_at_zero() {
        let buf = PositionedBuffer::new(10);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.remaining(), 10);
    }

    #[test]
    fn test_put_and_get_advance_position() {
        let mut buf = PositionedBuffer::new(16);
        buf.put(0xAB).unwrap();
        buf.put_u32_be(0x01020304).unwrap();
        buf.put_u64_be(u64::MAX).unwrap();
        assert_eq!(buf.position(), 13);
        assert_eq!(buf.written(), &[0xAB, 1, 2, 3, 4, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        buf.set_position(0).unwrap();
        assert_eq!(buf.get().unwrap(), 0xAB);
        assert_eq!(buf.get_u32_be().unwrap(), 0x01020304);
        assert_eq!(buf.get_u64_be().unwrap(), u64::MAX);
        assert_eq!(buf.remaining(), 3);
    }

    #[test]
    fn test_underflow_leaves_position() {
        let mut buf = PositionedBuffer::from_slice(&[1, 2, 3]);
        buf.get().unwrap();
        let err = buf.get_u64_be().unwrap_err();
        assert!(matches!(err, Error::BufferUnderflow { requested: 8, remaining: 2 }));
        assert_eq!(buf.position(), 1);
    }

    #[test]
    fn test_overflow_leaves_position() {
        let mut buf = PositionedBuffer::new(4);
        buf.put(1).unwrap();
        let err = buf.put_slice(&[0; 4]).unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { requested: 4, remaining: 3 }));
        assert_eq!(buf.position(), 1);
    }

    #[test]
    fn test_range_window_hides_surrounding_bytes() {
        let backing = vec![9, 9, 1, 2, 3, 9];
        let mut buf = PositionedBuffer::with_range(backing, 2, 3).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.get_slice(3).unwrap(), &[1, 2, 3]);
        assert!(buf.get().is_err());

        let inner = buf.into_inner();
        assert_eq!(inner, vec![9, 9, 1, 2, 3, 9]);
    }

    #[test]
    fn test_range_outside_backing_is_rejected() {
        let result = PositionedBuffer::with_range(vec![0; 4], 2, 3);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_shared_bytes_are_not_copied_for_reads() {
        let shared = Bytes::from_static(b"shared window");
        let mut buf = PositionedBuffer::from_bytes(shared.clone());
        assert_eq!(buf.as_slice().as_ptr(), shared.as_ptr());
        assert_eq!(buf.get_slice(6).unwrap(), b"shared");
        assert_eq!(buf.as_slice().as_ptr(), shared.as_ptr());
    }

    #[test]
    fn test_write_to_shared_bytes_copies_first() {
        let shared = Bytes::from(vec![1u8, 2, 3]);
        let mut buf = PositionedBuffer::from_bytes(shared.clone());
        buf.put(9).unwrap();
        assert_eq!(buf.as_slice(), &[9, 2, 3]);
        assert_eq!(shared.as_ref(), &[1, 2, 3]);

        let mut owned = PositionedBuffer::from_slice(&[9, 2, 3]);
        owned.set_position(1).unwrap();
        assert_eq!(buf, owned);
    }

    #[test]
    fn test_set_position_bounds() {
        let mut buf = PositionedBuffer::new(4);
        assert!(buf.set_position(4).is_ok());
        assert!(!buf.has_remaining());
        assert!(buf.set_position(5).is_err());
        assert_eq!(buf.position(), 4);
    }
}

//! Variable-length raw byte codec.

use super::{DataType, Order, PositionedBuffer};
use crate::error::{Error, Result};
use std::any::TypeId;

/// Copies bytes verbatim, with the sort order applied.
///
/// The encoding carries no length and no terminator, so the field length must
/// come from somewhere else: either the buffer ends where the value ends, or a
/// preceding field records it and the caller uses [`RawBytes::decode_len`].
///
/// Under [`Order::Descending`] every byte is inverted. That reverses the order
/// of equal-length values; a proper prefix still sorts before its extensions
/// because there is no terminator to invert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawBytes {
    order: Order,
}

impl RawBytes {
    /// Create a raw bytes codec with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Encode `vlen` bytes of `val` starting at `voff`.
    ///
    /// Lets callers encode a slice of a larger array without copying it out
    /// first.
    pub fn encode_range(
        &self,
        dst: &mut PositionedBuffer,
        val: &[u8],
        voff: usize,
        vlen: usize,
    ) -> Result<usize> {
        let end = voff
            .checked_add(vlen)
            .filter(|end| *end <= val.len())
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "range ({}, {}) outside value of length {}",
                    voff,
                    vlen,
                    val.len()
                ))
            })?;
        dst.put_slice(&val[voff..end])?;
        self.order.apply_slice(dst.last_written_mut(vlen));
        Ok(vlen)
    }

    /// Decode exactly `length` bytes.
    pub fn decode_len(&self, src: &mut PositionedBuffer, length: usize) -> Result<Vec<u8>> {
        let mut val = src.get_slice(length)?.to_vec();
        self.order.apply_slice(&mut val);
        Ok(val)
    }

    /// Skip a value that must be the final field of its record.
    ///
    /// Same effect as [`DataType::skip`]; the name documents the precondition
    /// at the call site.
    pub fn skip_trailing(&self, src: &mut PositionedBuffer) -> Result<usize> {
        self.skip(src)
    }
}

/// Ascending encodings sort exactly like the values. Descending encodings
/// reverse the order only among values of equal length: with no terminator to
/// invert, a proper prefix sorts before its extensions in both orders.
impl DataType for RawBytes {
    type Value = [u8];
    type Owned = Vec<u8>;

    /// True in both orders, with the descending prefix caveat above.
    fn is_order_preserving(&self) -> bool {
        true
    }

    fn order(&self) -> Order {
        self.order
    }

    fn is_nullable(&self) -> bool {
        false
    }

    fn is_skippable(&self) -> bool {
        false
    }

    fn encoded_length(&self, val: &[u8]) -> usize {
        val.len()
    }

    fn encoded_class(&self) -> TypeId {
        TypeId::of::<Vec<u8>>()
    }

    fn encode(&self, dst: &mut PositionedBuffer, val: &[u8]) -> Result<usize> {
        self.encode_range(dst, val, 0, val.len())
    }

    /// Consumes everything left in the buffer.
    fn decode(&self, src: &mut PositionedBuffer) -> Result<Vec<u8>> {
        let length = src.remaining();
        self.decode_len(src, length)
    }

    /// Without a length or terminator there is no way to find the end of one
    /// value, so this consumes the rest of the buffer. Only correct when the
    /// raw field is the last one in the record.
    fn skip(&self, src: &mut PositionedBuffer) -> Result<usize> {
        let skipped = src.remaining();
        src.set_position(src.len())?;
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_exact_length() {
        let codec = RawBytes::new(Order::Ascending);
        let mut buf = PositionedBuffer::new(10);

        let written = codec.encode_range(&mut buf, &[0x01, 0x02, 0x03], 0, 3).unwrap();
        assert_eq!(written, 3);
        assert_eq!(buf.position(), 3);
        assert_eq!(buf.written(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_decode_infers_length_from_remaining() {
        let codec = RawBytes::new(Order::Ascending);
        let mut buf = PositionedBuffer::from_slice(&[0x01, 0x02, 0x03]);
        assert_eq!(buf.remaining(), 3);

        assert_eq!(codec.decode(&mut buf).unwrap(), vec![0x01, 0x02, 0x03]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_encode_sub_range() {
        let codec = RawBytes::new(Order::Ascending);
        let mut buf = PositionedBuffer::new(4);
        let written = codec.encode_range(&mut buf, b"hello world", 6, 4).unwrap();
        assert_eq!(written, 4);
        assert_eq!(buf.written(), b"worl");

        let err = codec.encode_range(&mut buf, b"abc", 2, 5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_decode_len_reads_known_length() {
        let codec = RawBytes::new(Order::Ascending);
        let mut buf = PositionedBuffer::from_slice(b"abcdef");
        assert_eq!(codec.decode_len(&mut buf, 2).unwrap(), b"ab".to_vec());
        assert_eq!(codec.decode_len(&mut buf, 3).unwrap(), b"cde".to_vec());
        assert_eq!(buf.position(), 5);

        let err = codec.decode_len(&mut buf, 2).unwrap_err();
        assert!(matches!(err, Error::BufferUnderflow { requested: 2, remaining: 1 }));
        assert_eq!(buf.position(), 5);
    }

    #[test]
    fn test_skip_consumes_to_end() {
        let codec = RawBytes::new(Order::Ascending);
        let mut buf = PositionedBuffer::from_slice(b"first|second");
        buf.set_position(2).unwrap();
        assert_eq!(codec.skip(&mut buf).unwrap(), 10);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(codec.skip_trailing(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_descending_round_trip_and_order() {
        let codec = RawBytes::new(Order::Descending);
        let a = codec.encode_to_vec(b"abc").unwrap();
        let b = codec.encode_to_vec(b"abd").unwrap();
        assert!(a > b);
        assert_eq!(codec.decode_from_slice(&a).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_null_rejected() {
        let codec = RawBytes::default();
        let mut buf = PositionedBuffer::new(8);
        let err = codec.encode_nullable(&mut buf, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(buf.position(), 0);
        assert!(!codec.is_skippable());
        assert_eq!(codec.encoded_class(), TypeId::of::<Vec<u8>>());
    }

    #[test]
    fn test_descending_reverses_equal_lengths_only() {
        let codec = RawBytes::new(Order::Descending);
        let ab = codec.encode_to_vec(b"ab").unwrap();
        let ac = codec.encode_to_vec(b"ac").unwrap();
        let abc = codec.encode_to_vec(b"abc").unwrap();

        assert!(ab > ac);
        // A prefix still sorts first
        assert!(ab < abc);
        assert_eq!(codec.decode_from_slice(&abc).unwrap(), b"abc".to_vec());
    }
}

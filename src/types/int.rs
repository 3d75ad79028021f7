//! Order-preserving fixed-width integer codec.

use super::{skip_fixed, DataType, Order, PositionedBuffer};
use crate::error::Result;
use std::any::TypeId;

const SIGN: u64 = 1 << 63;

/// 8-byte order-preserving `i64` codec.
///
/// Two's complement values sort correctly as unsigned integers once the sign
/// bit is flipped, so the encoding is `(v as u64) ^ (1 << 63)` in big-endian,
/// with the sort order applied afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderedInt64 {
    order: Order,
}

impl OrderedInt64 {
    /// Encoded width in bytes.
    pub const WIDTH: usize = 8;

    /// Create a codec with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Encode a primitive `i64`.
    pub fn encode_i64(&self, dst: &mut PositionedBuffer, val: i64) -> Result<usize> {
        dst.put_u64_be((val as u64) ^ SIGN)?;
        self.order.apply_slice(dst.last_written_mut(Self::WIDTH));
        Ok(Self::WIDTH)
    }

    /// Decode a primitive `i64`.
    pub fn decode_i64(&self, src: &mut PositionedBuffer) -> Result<i64> {
        let mut raw = [0u8; Self::WIDTH];
        src.get_into(&mut raw)?;
        self.order.apply_slice(&mut raw);
        Ok((u64::from_be_bytes(raw) ^ SIGN) as i64)
    }
}

impl DataType for OrderedInt64 {
    type Value = i64;
    type Owned = i64;

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
        true
    }

    fn encoded_length(&self, _val: &i64) -> usize {
        Self::WIDTH
    }

    fn encoded_class(&self) -> TypeId {
        TypeId::of::<i64>()
    }

    fn encode(&self, dst: &mut PositionedBuffer, val: &i64) -> Result<usize> {
        self.encode_i64(dst, *val)
    }

    fn decode(&self, src: &mut PositionedBuffer) -> Result<i64> {
        self.decode_i64(src)
    }

    fn skip(&self, src: &mut PositionedBuffer) -> Result<usize> {
        skip_fixed(src, Self::WIDTH)
    }
}

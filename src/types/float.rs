//! Order-preserving fixed-width floating point codecs.
//!
//! IEEE-754 values are sign-magnitude, so their raw bit patterns do not sort
//! as unsigned integers. The fix-up used here: for non-negative values set the
//! sign bit; for negative values invert every bit. After that, big-endian
//! bytes compare like the floats they came from.
//!
//! NaN is not special-cased. A positive NaN (including the canonical
//! `0x7ff8_0000_0000_0000`) sorts after positive infinity and a negative NaN
//! sorts before negative infinity. `-0.0` sorts immediately before `+0.0`.

use super::{skip_fixed, DataType, Order, PositionedBuffer};
use crate::error::Result;
use std::any::TypeId;

const SIGN_64: u64 = 1 << 63;
const SIGN_32: u32 = 1 << 31;

fn ordered_bits_64(val: f64) -> u64 {
    let bits = val.to_bits();
    if bits & SIGN_64 != 0 {
        !bits
    } else {
        bits ^ SIGN_64
    }
}

fn natural_bits_64(ordered: u64) -> f64 {
    let bits = if ordered & SIGN_64 != 0 { ordered ^ SIGN_64 } else { !ordered };
    f64::from_bits(bits)
}

fn ordered_bits_32(val: f32) -> u32 {
    let bits = val.to_bits();
    if bits & SIGN_32 != 0 {
        !bits
    } else {
        bits ^ SIGN_32
    }
}

fn natural_bits_32(ordered: u32) -> f32 {
    let bits = if ordered & SIGN_32 != 0 { ordered ^ SIGN_32 } else { !ordered };
    f32::from_bits(bits)
}

fn put_ordered(dst: &mut PositionedBuffer, order: Order, bytes: &[u8]) -> Result<usize> {
    dst.put_slice(bytes)?;
    order.apply_slice(dst.last_written_mut(bytes.len()));
    Ok(bytes.len())
}

/// 8-byte order-preserving `f64` codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderedFloat64 {
    order: Order,
}

impl OrderedFloat64 {
    /// Encoded width in bytes.
    pub const WIDTH: usize = 8;

    /// Create a codec with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Encode a primitive `f64`.
    pub fn encode_f64(&self, dst: &mut PositionedBuffer, val: f64) -> Result<usize> {
        put_ordered(dst, self.order, &ordered_bits_64(val).to_be_bytes())
    }

    /// Decode a primitive `f64`.
    pub fn decode_f64(&self, src: &mut PositionedBuffer) -> Result<f64> {
        let mut raw = [0u8; Self::WIDTH];
        src.get_into(&mut raw)?;
        self.order.apply_slice(&mut raw);
        Ok(natural_bits_64(u64::from_be_bytes(raw)))
    }
}

impl DataType for OrderedFloat64 {
    type Value = f64;
    type Owned = f64;

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

    fn encoded_length(&self, _val: &f64) -> usize {
        Self::WIDTH
    }

    fn encoded_class(&self) -> TypeId {
        TypeId::of::<f64>()
    }

    fn encode(&self, dst: &mut PositionedBuffer, val: &f64) -> Result<usize> {
        self.encode_f64(dst, *val)
    }

    fn decode(&self, src: &mut PositionedBuffer) -> Result<f64> {
        self.decode_f64(src)
    }

    fn skip(&self, src: &mut PositionedBuffer) -> Result<usize> {
        skip_fixed(src, Self::WIDTH)
    }
}

/// 4-byte order-preserving `f32` codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderedFloat32 {
    order: Order,
}

impl OrderedFloat32 {
    /// Encoded width in bytes.
    pub const WIDTH: usize = 4;

    /// Create a codec with the given order.
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    /// Encode a primitive `f32`.
    pub fn encode_f32(&self, dst: &mut PositionedBuffer, val: f32) -> Result<usize> {
        put_ordered(dst, self.order, &ordered_bits_32(val).to_be_bytes())
    }

    /// Decode a primitive `f32`.
    pub fn decode_f32(&self, src: &mut PositionedBuffer) -> Result<f32> {
        let mut raw = [0u8; Self::WIDTH];
        src.get_into(&mut raw)?;
        self.order.apply_slice(&mut raw);
        Ok(natural_bits_32(u32::from_be_bytes(raw)))
    }
}

impl DataType for OrderedFloat32 {
    type Value = f32;
    type Owned = f32;

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

    fn encoded_length(&self, _val: &f32) -> usize {
        Self::WIDTH
    }

    fn encoded_class(&self) -> TypeId {
        TypeId::of::<f32>()
    }

    fn encode(&self, dst: &mut PositionedBuffer, val: &f32) -> Result<usize> {
        self.encode_f32(dst, *val)
    }

    fn decode(&self, src: &mut PositionedBuffer) -> Result<f32> {
        self.decode_f32(src)
    }

    fn skip(&self, src: &mut PositionedBuffer) -> Result<usize> {
        skip_fixed(src, Self::WIDTH)
    }
}

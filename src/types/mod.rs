//! Typed, order-preserving value codecs.
//!
//! A [`DataType`] turns a value into bytes inside a [`PositionedBuffer`] and
//! back again. Order-preserving codecs guarantee that comparing two encodings
//! as unsigned bytes gives the same answer as comparing the values, which lets
//! index and bloom-filter code compare keys without decoding them.
//!
//! ## Codecs
//!
//! | Codec            | Width    | Nullable | Skippable |
//! |------------------|----------|----------|-----------|
//! | [`RawBytes`]       | variable | no       | no        |
//! | [`OrderedFloat64`] | 8        | no       | yes       |
//! | [`OrderedFloat32`] | 4        | no       | yes       |
//! | [`OrderedInt64`]   | 8        | no       | yes       |

mod buffer;
mod float;
mod int;
mod order;
mod raw_bytes;

pub use buffer::PositionedBuffer;
pub use float::{OrderedFloat32, OrderedFloat64};
pub use int::OrderedInt64;
pub use order::Order;
pub use raw_bytes::RawBytes;

use crate::error::{Error, Result};
use std::any::TypeId;

/// The capability set shared by every value codec.
///
/// `Value` is the borrowed form handed to `encode` (for example `[u8]`), and
/// `Owned` is what `decode` produces (for example `Vec<u8>`).
///
/// Laws every implementation upholds:
///
/// - `decode` after `encode` on the same bytes returns the original value.
/// - `encoded_length(v)` equals the count returned by `encode(_, v)`.
/// - If `is_order_preserving()`, unsigned lexicographic comparison of
///   encodings matches the natural comparison of values, reversed when
///   `order()` is [`Order::Descending`].
pub trait DataType {
    /// The borrowed value type accepted by `encode`.
    type Value: ?Sized;

    /// The value type produced by `decode`.
    type Owned;

    /// True if encoded bytes sort like the values they encode.
    fn is_order_preserving(&self) -> bool;

    /// The sort order applied to encoded bytes.
    fn order(&self) -> Order;

    /// True if the codec can represent a null value.
    fn is_nullable(&self) -> bool;

    /// True if `skip` can step over exactly one encoded value.
    fn is_skippable(&self) -> bool;

    /// Number of bytes `encode` will write for `val`.
    fn encoded_length(&self, val: &Self::Value) -> usize;

    /// The type tag of decoded values.
    fn encoded_class(&self) -> TypeId;

    /// Write `val` at the buffer position and return the byte count.
    fn encode(&self, dst: &mut PositionedBuffer, val: &Self::Value) -> Result<usize>;

    /// Read one value at the buffer position.
    fn decode(&self, src: &mut PositionedBuffer) -> Result<Self::Owned>;

    /// Advance past one encoded value without materialising it.
    fn skip(&self, src: &mut PositionedBuffer) -> Result<usize>;

    /// Write the null marker. Only nullable codecs override this.
    fn encode_null(&self, _dst: &mut PositionedBuffer) -> Result<usize> {
        Err(Error::invalid_argument("codec does not support null values"))
    }

    /// Encode a possibly-null value.
    ///
    /// `None` into a non-nullable codec fails with
    /// [`Error::InvalidArgument`] before touching the buffer.
    fn encode_nullable(&self, dst: &mut PositionedBuffer, val: Option<&Self::Value>) -> Result<usize> {
        match val {
            Some(v) => self.encode(dst, v),
            None if self.is_nullable() => self.encode_null(dst),
            None => Err(Error::invalid_argument("null value for non-nullable codec")),
        }
    }

    /// Encode `val` into a freshly sized byte vector.
    fn encode_to_vec(&self, val: &Self::Value) -> Result<Vec<u8>> {
        let mut buf = PositionedBuffer::new(self.encoded_length(val));
        self.encode(&mut buf, val)?;
        Ok(buf.into_inner())
    }

    /// Decode one value from the start of `bytes`.
    fn decode_from_slice(&self, bytes: &[u8]) -> Result<Self::Owned> {
        let mut buf = PositionedBuffer::from_slice(bytes);
        self.decode(&mut buf)
    }
}

/// Step a buffer past `width` bytes of a fixed-width encoding.
pub(crate) fn skip_fixed(src: &mut PositionedBuffer, width: usize) -> Result<usize> {
    if src.remaining() < width {
        return Err(Error::BufferUnderflow { requested: width, remaining: src.remaining() });
    }
    src.set_position(src.position() + width)?;
    Ok(width)
}

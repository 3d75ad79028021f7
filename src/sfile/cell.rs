//! Cells: one key and value read back from a storage file.

use crate::error::Result;
use crate::types::{DataType, PositionedBuffer};
use bytes::Bytes;

/// A key-value pair as stored, before codec decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Encoded key
    pub key: Bytes,
    /// Encoded value
    pub value: Bytes,
}

impl Cell {
    /// Create a new cell
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Key bytes wrapped for a codec to read, sharing the cell's storage.
    pub fn key_buffer(&self) -> PositionedBuffer {
        PositionedBuffer::from_bytes(self.key.clone())
    }

    /// Value bytes wrapped for a codec to read.
    pub fn value_buffer(&self) -> PositionedBuffer {
        PositionedBuffer::from_bytes(self.value.clone())
    }

    /// Decode the key with `codec`.
    pub fn decode_key<T: DataType>(&self, codec: &T) -> Result<T::Owned> {
        codec.decode(&mut self.key_buffer())
    }

    /// Decode the value with `codec`.
    pub fn decode_value<T: DataType>(&self, codec: &T) -> Result<T::Owned> {
        codec.decode(&mut self.value_buffer())
    }
}

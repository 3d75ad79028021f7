//! Blocks that can live in the block cache and be rebuilt from bytes.

use crate::error::Result;
use crate::sfile::BlockType;
use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A decoded unit of storage-file content held by the block cache.
///
/// Implementations must be able to serialize themselves into bytes that the
/// matching [`CacheableDeserializer`] turns back into an equivalent block.
pub trait Cacheable: Send + Sync + fmt::Debug {
    /// Which kind of block this is.
    fn block_type(&self) -> BlockType;

    /// Length of the serialized form, used for cache size accounting.
    fn serialized_len(&self) -> usize;

    /// Serialized form, fed back to the deserializer on rehydration.
    fn serialize(&self) -> Bytes;

    /// Downcasting hook for readers that need the concrete block.
    fn as_any(&self) -> &dyn Any;
}

/// Rebuilds one kind of [`Cacheable`] from its serialized bytes.
pub trait CacheableDeserializer: Send + Sync {
    /// Decode a block.
    fn deserialize(&self, bytes: Bytes) -> Result<Arc<dyn Cacheable>>;

    /// Stable name of the block kind this deserializer produces.
    ///
    /// Persisted next to cached bytes so that a later process can map a stale
    /// id back to a kind. Must not change between releases.
    fn kind_name(&self) -> &'static str;
}

impl fmt::Debug for dyn CacheableDeserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheableDeserializer").field("kind", &self.kind_name()).finish()
    }
}

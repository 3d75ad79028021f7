//! Block cache shared by storage-file readers.
//!
//! - [`cacheable`]: the traits a cached block and its deserializer implement
//! - [`registry`]: process-scoped ids for deserializers
//! - [`BlockCache`]: LRU of warm and cold blocks
//! - [`persist`]: write a cache to disk and restore it in another process

pub mod cacheable;
mod lru;
pub mod persist;
pub mod registry;

pub use cacheable::{Cacheable, CacheableDeserializer};
pub use lru::{BlockCache, CacheKey, CacheStats, CachedBlock};
pub use persist::{persist, restore, PersistedBlock, PersistedCache, RestoreReport};
pub use registry::{DeserializerRegistry, RegistrySnapshot};

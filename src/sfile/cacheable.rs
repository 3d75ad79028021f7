//! Storage-file blocks as cacheable values, and the cache settings readers
//! and writers share.

use crate::cache::{BlockCache, Cacheable, CacheableDeserializer, DeserializerRegistry};
use crate::error::Result;
use crate::filter::{BloomFilter, Filter};
use crate::sfile::block::Block;
use crate::sfile::index::IndexBlock;
use crate::sfile::BlockType;
use bytes::Bytes;
use std::any::Any;
use std::sync::Arc;

/// Kind name of data blocks in the deserializer registry.
pub const DATA_BLOCK_KIND: &str = "sfile.data";
/// Kind name of index blocks in the deserializer registry.
pub const INDEX_BLOCK_KIND: &str = "sfile.index";
/// Kind name of bloom blocks in the deserializer registry.
pub const BLOOM_BLOCK_KIND: &str = "sfile.bloom";

/// A parsed data block.
#[derive(Debug, Clone)]
pub struct DataBlock(pub Block);

impl Cacheable for DataBlock {
    fn block_type(&self) -> BlockType {
        BlockType::Data
    }

    fn serialized_len(&self) -> usize {
        self.0.data().len()
    }

    fn serialize(&self) -> Bytes {
        self.0.data().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Cacheable for IndexBlock {
    fn block_type(&self) -> BlockType {
        BlockType::Index
    }

    fn serialized_len(&self) -> usize {
        self.data().len()
    }

    fn serialize(&self) -> Bytes {
        self.data().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A decoded bloom filter block.
#[derive(Debug, Clone)]
pub struct BloomBlock {
    filter: BloomFilter,
    encoded: Bytes,
}

impl BloomBlock {
    /// Decode a bloom block payload.
    pub fn decode(encoded: Bytes) -> Result<Self> {
        let filter = BloomFilter::decode(&encoded)?;
        Ok(Self { filter, encoded })
    }

    /// The filter.
    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    /// Check if a key may be present.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.filter.may_contain(key)
    }
}

impl From<BloomFilter> for BloomBlock {
    fn from(filter: BloomFilter) -> Self {
        let encoded = Bytes::from(filter.encode());
        Self { filter, encoded }
    }
}

impl Cacheable for BloomBlock {
    fn block_type(&self) -> BlockType {
        BlockType::Bloom
    }

    fn serialized_len(&self) -> usize {
        self.encoded.len()
    }

    fn serialize(&self) -> Bytes {
        self.encoded.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DataBlockDeserializer;

impl CacheableDeserializer for DataBlockDeserializer {
    fn deserialize(&self, bytes: Bytes) -> Result<Arc<dyn Cacheable>> {
        Ok(Arc::new(DataBlock(Block::new(bytes)?)))
    }

    fn kind_name(&self) -> &'static str {
        DATA_BLOCK_KIND
    }
}

struct IndexBlockDeserializer;

impl CacheableDeserializer for IndexBlockDeserializer {
    fn deserialize(&self, bytes: Bytes) -> Result<Arc<dyn Cacheable>> {
        Ok(Arc::new(IndexBlock::new(bytes)?))
    }

    fn kind_name(&self) -> &'static str {
        INDEX_BLOCK_KIND
    }
}

struct BloomBlockDeserializer;

impl CacheableDeserializer for BloomBlockDeserializer {
    fn deserialize(&self, bytes: Bytes) -> Result<Arc<dyn Cacheable>> {
        Ok(Arc::new(BloomBlock::decode(bytes)?))
    }

    fn kind_name(&self) -> &'static str {
        BLOOM_BLOCK_KIND
    }
}

/// Deserializer ids of the three storage-file block kinds in one registry.
#[derive(Debug)]
pub struct BlockDeserializers {
    registry: Arc<DeserializerRegistry>,
    data_id: i32,
    index_id: i32,
    bloom_id: i32,
}

impl BlockDeserializers {
    /// Register the block kinds with `registry`.
    ///
    /// Kinds already present in the registry keep their existing id, so
    /// calling this repeatedly on one registry, from any number of threads,
    /// does not grow it.
    pub fn register(registry: Arc<DeserializerRegistry>) -> Arc<Self> {
        let data_id = registry.register_if_absent(Arc::new(DataBlockDeserializer));
        let index_id = registry.register_if_absent(Arc::new(IndexBlockDeserializer));
        let bloom_id = registry.register_if_absent(Arc::new(BloomBlockDeserializer));

        Arc::new(Self { registry, data_id, index_id, bloom_id })
    }

    /// Id of the data-block deserializer.
    pub fn data_id(&self) -> i32 {
        self.data_id
    }

    /// Id of the index-block deserializer.
    pub fn index_id(&self) -> i32 {
        self.index_id
    }

    /// Id of the bloom-block deserializer.
    pub fn bloom_id(&self) -> i32 {
        self.bloom_id
    }

    /// Id for a block type.
    pub fn id_for(&self, block_type: BlockType) -> i32 {
        match block_type {
            BlockType::Data => self.data_id,
            BlockType::Index => self.index_id,
            BlockType::Bloom => self.bloom_id,
        }
    }

    /// The registry the ids belong to.
    pub fn registry(&self) -> &Arc<DeserializerRegistry> {
        &self.registry
    }
}

/// Block cache settings shared by readers and writers of storage files.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared block cache. `None` disables caching.
    pub block_cache: Option<Arc<BlockCache>>,

    /// Deserializer ids used to tag cached blocks.
    pub deserializers: Arc<BlockDeserializers>,

    /// Cache data blocks read from disk.
    /// Default: true
    pub cache_data_on_read: bool,

    /// Cache data blocks as the writer flushes them.
    /// Default: false
    pub cache_on_write: bool,

    /// Evict a file's blocks when its reader closes. Only prefetching
    /// readers act on this.
    /// Default: false
    pub evict_on_close: bool,
}

impl CacheConfig {
    /// Cache through `cache` with default flags.
    pub fn new(cache: Arc<BlockCache>, deserializers: Arc<BlockDeserializers>) -> Self {
        Self {
            block_cache: Some(cache),
            deserializers,
            cache_data_on_read: true,
            cache_on_write: false,
            evict_on_close: false,
        }
    }

    /// No block cache.
    pub fn disabled(deserializers: Arc<BlockDeserializers>) -> Self {
        Self {
            block_cache: None,
            deserializers,
            cache_data_on_read: false,
            cache_on_write: false,
            evict_on_close: false,
        }
    }

    /// Sets whether data blocks read from disk are cached.
    pub fn cache_data_on_read(mut self, value: bool) -> Self {
        self.cache_data_on_read = value;
        self
    }

    /// Sets whether the writer caches blocks it flushes.
    pub fn cache_on_write(mut self, value: bool) -> Self {
        self.cache_on_write = value;
        self
    }

    /// Sets whether closing a prefetching reader evicts its blocks.
    pub fn evict_on_close(mut self, value: bool) -> Self {
        self.evict_on_close = value;
        self
    }

    /// The cache, when caching is enabled.
    pub fn cache(&self) -> Option<&Arc<BlockCache>> {
        self.block_cache.as_ref()
    }

    /// The registry the deserializer ids belong to.
    pub fn registry(&self) -> &Arc<DeserializerRegistry> {
        self.deserializers.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfile::block::BlockBuilder;

    #[test]
    fn test_register_is_idempotent_per_registry() {
        let registry = Arc::new(DeserializerRegistry::new());
        let first = BlockDeserializers::register(Arc::clone(&registry));
        let second = BlockDeserializers::register(Arc::clone(&registry));

        assert_eq!(registry.len(), 3);
        assert_eq!(first.data_id(), second.data_id());
        assert_eq!(first.id_for(BlockType::Bloom), first.bloom_id());
        assert_eq!(registry.snapshot().kind_name(first.index_id()), Some(INDEX_BLOCK_KIND));
    }

    #[test]
    fn test_blocks_rehydrate_through_registry() {
        let registry = Arc::new(DeserializerRegistry::new());
        let kinds = BlockDeserializers::register(Arc::clone(&registry));

        let mut builder = BlockBuilder::new(16);
        builder.add(b"k1", b"v1").unwrap();
        let data = DataBlock(Block::new(builder.finish()).unwrap());

        let d = registry.resolve(kinds.data_id()).unwrap();
        let rebuilt = d.deserialize(data.serialize()).unwrap();
        assert_eq!(rebuilt.block_type(), BlockType::Data);
        let rebuilt = rebuilt.as_any().downcast_ref::<DataBlock>().unwrap();
        assert_eq!(rebuilt.0.get(b"k1").unwrap().as_deref(), Some(&b"v1"[..]));

        let mut filter = BloomFilter::new(10, 0.01);
        filter.add(b"k1");
        let bloom = BloomBlock::from(filter);
        let d = registry.resolve(kinds.bloom_id()).unwrap();
        let rebuilt = d.deserialize(bloom.serialize()).unwrap();
        let rebuilt = rebuilt.as_any().downcast_ref::<BloomBlock>().unwrap();
        assert!(rebuilt.may_contain(b"k1"));
    }

    #[test]
    fn test_deserializer_rejects_garbage() {
        let registry = Arc::new(DeserializerRegistry::new());
        let kinds = BlockDeserializers::register(Arc::clone(&registry));
        let d = registry.resolve(kinds.index_id()).unwrap();
        assert!(d.deserialize(Bytes::from_static(b"xy")).unwrap_err().is_corruption());
    }

    #[test]
    fn test_cache_config_flags() {
        let kinds = BlockDeserializers::register(Arc::new(DeserializerRegistry::new()));
        let config = CacheConfig::new(Arc::new(BlockCache::new(1024)), Arc::clone(&kinds))
            .cache_on_write(true)
            .evict_on_close(true);
        assert!(config.cache().is_some());
        assert!(config.cache_data_on_read && config.cache_on_write && config.evict_on_close);

        let disabled = CacheConfig::disabled(kinds);
        assert!(disabled.cache().is_none());
        assert_eq!(disabled.registry().len(), 3);
    }
}

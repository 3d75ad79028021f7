//! LRU (Least Recently Used) block cache shared by storage-file readers.
//!
//! Entries are either *warm* (a decoded block, ready to use) or *cold* (the
//! serialized bytes of a block plus the id of the deserializer that rebuilds
//! it). Cold entries come from a restored cache; the first hit rehydrates them
//! through the [`DeserializerRegistry`] and the cache keeps the warm result.

use crate::cache::cacheable::Cacheable;
use crate::cache::registry::DeserializerRegistry;
use crate::error::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A unique identifier for a cached block.
///
/// Combines the storage file name and block offset, so readers opened over
/// the same file share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Storage file name
    pub file: Arc<str>,
    /// Block offset in the file
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(file: impl Into<Arc<str>>, offset: u64) -> Self {
        Self { file: file.into(), offset }
    }
}

/// A resident cache entry.
#[derive(Debug, Clone)]
pub enum CachedBlock {
    /// Decoded block, tagged with its deserializer id.
    Warm {
        /// Id of the deserializer that rebuilds this block.
        deserializer_id: i32,
        /// The decoded block.
        block: Arc<dyn Cacheable>,
    },
    /// Serialized block waiting to be rehydrated.
    Cold {
        /// Id of the deserializer that rebuilds this block.
        deserializer_id: i32,
        /// Serialized block bytes.
        bytes: Bytes,
    },
}

impl CachedBlock {
    /// The deserializer id the entry is tagged with.
    pub fn deserializer_id(&self) -> i32 {
        match self {
            CachedBlock::Warm { deserializer_id, .. } | CachedBlock::Cold { deserializer_id, .. } => {
                *deserializer_id
            }
        }
    }

    /// Bytes charged against cache capacity.
    pub fn charge(&self) -> usize {
        match self {
            CachedBlock::Warm { block, .. } => block.serialized_len(),
            CachedBlock::Cold { bytes, .. } => bytes.len(),
        }
    }

    /// Serialized form of the entry.
    pub fn serialized(&self) -> Bytes {
        match self {
            CachedBlock::Warm { block, .. } => block.serialize(),
            CachedBlock::Cold { bytes, .. } => bytes.clone(),
        }
    }

    /// True for entries that still need rehydration.
    pub fn is_cold(&self) -> bool {
        matches!(self, CachedBlock::Cold { .. })
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions (capacity, explicit, and per-file)
    pub evictions: u64,
    /// Number of cold entries turned warm
    pub rehydrations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, CachedBlock>,
    /// Most recently used at the back.
    queue: VecDeque<CacheKey>,
    size: usize,
}

impl LruState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.queue.iter().position(|k| k == key) {
            self.queue.remove(pos);
        }
        self.queue.push_back(key.clone());
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedBlock> {
        let removed = self.entries.remove(key)?;
        self.size -= removed.charge();
        if let Some(pos) = self.queue.iter().position(|k| k == key) {
            self.queue.remove(pos);
        }
        Some(removed)
    }

    fn pop_lru(&mut self) -> bool {
        while let Some(key) = self.queue.pop_front() {
            if let Some(removed) = self.entries.remove(&key) {
                self.size -= removed.charge();
                return true;
            }
        }
        false
    }
}

/// Thread-safe LRU cache for storage-file blocks.
///
/// Capacity is measured in serialized bytes. A capacity of 0 disables the
/// cache: inserts are dropped and every lookup misses.
///
/// # Thread Safety
///
/// Shared across readers as `Arc<BlockCache>`.
#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    state: RwLock<LruState>,
    stats: RwLock<CacheStats>,
}

impl BlockCache {
    /// Create a new BlockCache with the specified capacity in bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellfile::cache::BlockCache;
    ///
    /// // Create a 8MB cache
    /// let cache = BlockCache::new(8 * 1024 * 1024);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: RwLock::new(LruState::default()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get an entry, warm or cold, and mark it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<CachedBlock> {
        self.stats.write().lookups += 1;

        if self.capacity == 0 {
            self.stats.write().misses += 1;
            return None;
        }

        let mut state = self.state.write();
        match state.entries.get(key).cloned() {
            Some(entry) => {
                state.touch(key);
                drop(state);
                self.stats.write().hits += 1;
                Some(entry)
            }
            None => {
                drop(state);
                self.stats.write().misses += 1;
                None
            }
        }
    }

    /// Get a decoded block, rehydrating a cold entry through `registry`.
    ///
    /// Returns [`Error::DeserializerNotFound`](crate::Error::DeserializerNotFound)
    /// when a cold entry's id is not registered. The entry is left in place;
    /// callers decide whether to evict it.
    pub fn get_block(
        &self,
        key: &CacheKey,
        registry: &DeserializerRegistry,
    ) -> Result<Option<Arc<dyn Cacheable>>> {
        let (deserializer_id, bytes) = match self.get(key) {
            None => return Ok(None),
            Some(CachedBlock::Warm { block, .. }) => return Ok(Some(block)),
            Some(CachedBlock::Cold { deserializer_id, bytes }) => (deserializer_id, bytes),
        };

        let deserializer = registry.resolve(deserializer_id)?;
        let block = deserializer.deserialize(bytes)?;

        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(key) {
            if entry.is_cold() && entry.deserializer_id() == deserializer_id {
                let before = entry.charge();
                *entry = CachedBlock::Warm { deserializer_id, block: Arc::clone(&block) };
                let after = entry.charge();
                state.size = state.size - before + after;
            }
        }
        drop(state);
        self.stats.write().rehydrations += 1;

        Ok(Some(block))
    }

    /// Insert a decoded block tagged with its deserializer id.
    pub fn insert_block(&self, key: CacheKey, deserializer_id: i32, block: Arc<dyn Cacheable>) {
        self.insert(key, CachedBlock::Warm { deserializer_id, block });
    }

    /// Insert serialized block bytes tagged with a deserializer id.
    pub fn insert_serialized(&self, key: CacheKey, deserializer_id: i32, bytes: Bytes) {
        self.insert(key, CachedBlock::Cold { deserializer_id, bytes });
    }

    /// Insert an entry, evicting least recently used entries to make room.
    ///
    /// Entries larger than the whole cache are not cached.
    pub fn insert(&self, key: CacheKey, entry: CachedBlock) {
        let charge = entry.charge();
        if self.capacity == 0 || charge > self.capacity {
            return;
        }

        let mut evicted = 0;
        let mut state = self.state.write();
        state.remove(&key);
        while state.size + charge > self.capacity {
            if !state.pop_lru() {
                break;
            }
            evicted += 1;
        }
        state.entries.insert(key.clone(), entry);
        state.queue.push_back(key);
        state.size += charge;
        drop(state);

        let mut stats = self.stats.write();
        stats.insertions += 1;
        stats.evictions += evicted;
    }

    /// True if `key` is resident. Does not count as a lookup.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Remove one entry.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let removed = self.state.write().remove(key).is_some();
        if removed {
            self.stats.write().evictions += 1;
        }
        removed
    }

    /// Remove every entry belonging to `file` and return how many went.
    pub fn evict_file(&self, file: &str) -> usize {
        let mut state = self.state.write();
        let keys: Vec<CacheKey> =
            state.entries.keys().filter(|k| k.file.as_ref() == file).cloned().collect();
        for key in &keys {
            state.remove(key);
        }
        drop(state);

        if !keys.is_empty() {
            self.stats.write().evictions += keys.len() as u64;
            log::debug!("Evicted {} cached blocks of {}", keys.len(), file);
        }
        keys.len()
    }

    /// Point-in-time copy of all entries, least recently used first.
    pub fn entries(&self) -> Vec<(CacheKey, CachedBlock)> {
        let state = self.state.read();
        state
            .queue
            .iter()
            .filter_map(|k| state.entries.get(k).map(|e| (k.clone(), e.clone())))
            .collect()
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.stats.write().reset();
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.queue.clear();
        state.size = 0;
    }

    /// Get the current size of cached data in bytes.
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// Get the cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

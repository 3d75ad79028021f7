//! Saving a block cache to disk and loading it back in a later process.
//!
//! File format:
//! ```text
//! [magic: u64 le][crc32(payload): u32 le][payload: bincode(PersistedCache)]
//! ```
//!
//! Deserializer ids are process-scoped, so the payload carries the registry
//! snapshot of the writing process. On restore each stored id is translated
//! to its kind name and then to whatever id that kind has in the live
//! registry.

use crate::cache::lru::{BlockCache, CacheKey};
use crate::cache::registry::{DeserializerRegistry, RegistrySnapshot};
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const PERSIST_MAGIC: u64 = 0x4346_424c_4b43_4143;
const HEADER_SIZE: usize = 12;

/// One cached block in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBlock {
    /// Storage file name the block belongs to
    pub file: String,
    /// Block offset in that file
    pub offset: u64,
    /// Deserializer id in the writing process
    pub deserializer_id: i32,
    /// Serialized block
    pub bytes: Vec<u8>,
}

/// Everything needed to rebuild a cache in another process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCache {
    /// Registry of the writing process
    pub snapshot: RegistrySnapshot,
    /// Blocks, least recently used first
    pub entries: Vec<PersistedBlock>,
}

impl PersistedCache {
    /// Capture the current contents of `cache`.
    pub fn capture(cache: &BlockCache, registry: &DeserializerRegistry) -> Self {
        let entries = cache
            .entries()
            .into_iter()
            .map(|(key, entry)| PersistedBlock {
                file: key.file.to_string(),
                offset: key.offset,
                deserializer_id: entry.deserializer_id(),
                bytes: entry.serialized().to_vec(),
            })
            .collect();
        Self { snapshot: registry.snapshot(), entries }
    }

    /// Encode with header and checksum.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&PERSIST_MAGIC.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption("Persisted cache too short"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[0..8]);
        let magic = u64::from_le_bytes(magic);
        if magic != PERSIST_MAGIC {
            return Err(Error::corruption(format!("Bad persisted cache magic: {:#x}", magic)));
        }

        let expected = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let payload = &data[HEADER_SIZE..];
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        Ok(bincode::deserialize(payload)?)
    }
}

/// Outcome of [`restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Blocks loaded into the cache as cold entries
    pub restored: usize,
    /// Blocks whose kind has no live deserializer
    pub dropped: usize,
}

/// Write every resident block of `cache` to `path`.
///
/// Returns the number of blocks written.
pub fn persist(cache: &BlockCache, registry: &DeserializerRegistry, path: &Path) -> Result<usize> {
    let persisted = PersistedCache::capture(cache, registry);
    let encoded = persisted.encode()?;

    let mut file = File::create(path)?;
    file.write_all(&encoded)?;
    file.sync_all()?;

    log::info!("Persisted {} cached blocks to {}", persisted.entries.len(), path.display());
    Ok(persisted.entries.len())
}

/// Load blocks written by [`persist`] into `cache` as cold entries.
pub fn restore(
    cache: &BlockCache,
    registry: &DeserializerRegistry,
    path: &Path,
) -> Result<RestoreReport> {
    let data = fs::read(path)?;
    let persisted = PersistedCache::decode(&data)?;

    let mut remapped: HashMap<i32, Option<i32>> = HashMap::new();
    let mut report = RestoreReport::default();

    for block in persisted.entries {
        let live_id = *remapped.entry(block.deserializer_id).or_insert_with(|| {
            persisted
                .snapshot
                .kind_name(block.deserializer_id)
                .and_then(|kind| registry.id_for_kind(kind))
        });

        match live_id {
            Some(id) => {
                cache.insert_serialized(
                    CacheKey::new(block.file, block.offset),
                    id,
                    Bytes::from(block.bytes),
                );
                report.restored += 1;
            }
            None => {
                log::warn!(
                    "Dropping persisted block {}@{}: no live deserializer for id {}",
                    block.file,
                    block.offset,
                    block.deserializer_id
                );
                report.dropped += 1;
            }
        }
    }

    log::info!(
        "Restored {} cached blocks from {} ({} dropped)",
        report.restored,
        path.display(),
        report.dropped
    );
    Ok(report)
}

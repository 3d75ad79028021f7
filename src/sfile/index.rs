//! Index block implementation for storage files.
//!
//! The index block maps the last key of each data block to that block's
//! handle. It is decoded once into a sorted vector so lookups are a binary
//! search.

use crate::error::{Error, Result};
use crate::sfile::block::{Block, BlockBuilder};
use crate::sfile::footer::BlockHandle;
use bytes::Bytes;

/// IndexEntry represents a single entry in the index block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The largest key in the data block
    pub key: Vec<u8>,
    /// Handle to the data block
    pub handle: BlockHandle,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(key: Vec<u8>, handle: BlockHandle) -> Self {
        Self { key, handle }
    }
}

/// Decoded index block.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    data: Bytes,
    entries: Vec<IndexEntry>,
}

impl IndexBlock {
    /// Parse an index block from raw (decompressed) data
    pub fn new(data: Bytes) -> Result<Self> {
        let block = Block::new(data.clone())?;
        let mut entries: Vec<IndexEntry> = Vec::new();

        let mut iter = block.iter();
        iter.seek_to_first();
        while iter.advance() {
            let handle = BlockHandle::decode(iter.value())?;
            if let Some(prev) = entries.last() {
                if prev.key.as_slice() >= iter.key() || prev.handle.end_offset() > handle.offset {
                    return Err(Error::corruption("Index entries out of order"));
                }
            }
            entries.push(IndexEntry::new(iter.key().to_vec(), handle));
        }
        iter.status()?;

        Ok(Self { data, entries })
    }

    /// Position of the first data block whose last key is >= `key`.
    ///
    /// Returns `None` when `key` is past the last block.
    pub fn find_block_index(&self, key: &[u8]) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.key.as_slice() < key);
        (idx < self.entries.len()).then_some(idx)
    }

    /// Handle of the data block that may contain `key`.
    pub fn find_block(&self, key: &[u8]) -> Option<BlockHandle> {
        self.find_block_index(key).map(|i| self.entries[i].handle)
    }

    /// All entries in key order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entry at position `index`
    pub fn entry(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    /// Get the number of entries in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw block this index was parsed from
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Default for IndexBlock {
    /// An index with no entries.
    fn default() -> Self {
        Self { data: Bytes::new(), entries: Vec::new() }
    }
}

/// IndexBlockBuilder builds an index block.
pub struct IndexBlockBuilder {
    builder: BlockBuilder,
}

impl IndexBlockBuilder {
    /// Create a new IndexBlockBuilder
    pub fn new() -> Self {
        // Every entry is a restart point so index keys are stored whole
        Self { builder: BlockBuilder::new(1) }
    }

    /// Add an index entry
    pub fn add_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        self.builder.add(&entry.key, &entry.handle.encode())
    }

    /// Finish building and return the block data
    pub fn finish(self) -> Bytes {
        self.builder.finish()
    }

    /// Check if the builder is empty
    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }
}

impl Default for IndexBlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

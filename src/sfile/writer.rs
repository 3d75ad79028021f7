//! Storage-file writer.
//!
//! Builds a storage file from a sequence of sorted key-value pairs.

use crate::cache::CacheKey;
use crate::config::WriterOptions;
use crate::error::{Error, Result};
use crate::filter::{BloomFilter, Filter};
use crate::sfile::block::{self, Block, BlockBuilder};
use crate::sfile::cacheable::{CacheConfig, DataBlock};
use crate::sfile::footer::{BlockHandle, Footer};
use crate::sfile::index::{IndexBlockBuilder, IndexEntry};
use crate::sfile::{BlockType, CompressionType, FOOTER_SIZE};
use crate::types::DataType;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Summary of a finished storage file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Where the file was written
    pub path: PathBuf,
    /// Total size in bytes
    pub file_size: u64,
    /// Number of cells
    pub num_entries: u64,
    /// Number of data blocks
    pub num_data_blocks: usize,
    /// First key, if any cell was written
    pub smallest_key: Option<Vec<u8>>,
    /// Last key, if any cell was written
    pub largest_key: Option<Vec<u8>>,
}

/// StorageFileWriter builds a storage file.
///
/// Usage:
/// ```no_run
/// use cellfile::config::WriterOptions;
/// use cellfile::sfile::StorageFileWriter;
///
/// let mut writer = StorageFileWriter::create("cells.sf", WriterOptions::default()).unwrap();
/// writer.add(b"key1", b"value1").unwrap();
/// writer.add(b"key2", b"value2").unwrap();
/// writer.finish().unwrap();
/// ```
pub struct StorageFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    file_name: Arc<str>,
    options: WriterOptions,
    cache: Option<CacheConfig>,
    data_block_builder: BlockBuilder,
    index_block_builder: IndexBlockBuilder,
    bloom: Option<BloomFilter>,
    smallest_key: Option<Vec<u8>>,
    last_key: Vec<u8>,
    offset: u64,
    num_entries: u64,
    num_data_blocks: usize,
}

impl StorageFileWriter {
    /// Create the file at `path`, truncating anything already there.
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);

        let bloom = options
            .use_bloom_filter
            .then(|| BloomFilter::new(options.expected_keys, options.bloom_fp_rate));

        Ok(Self {
            writer,
            file_name: Arc::from(path.to_string_lossy().as_ref()),
            path,
            data_block_builder: BlockBuilder::new(options.restart_interval),
            index_block_builder: IndexBlockBuilder::new(),
            options,
            cache: None,
            bloom,
            smallest_key: None,
            last_key: Vec::new(),
            offset: 0,
            num_entries: 0,
            num_data_blocks: 0,
        })
    }

    /// Cache data blocks as they are flushed, when `config.cache_on_write`
    /// is set.
    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Add a key-value pair.
    ///
    /// Keys must be non-empty and strictly increasing.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("Key cannot be empty"));
        }
        if self.num_entries > 0 && key <= self.last_key.as_slice() {
            return Err(Error::invalid_argument("Keys must be added in sorted order"));
        }

        self.data_block_builder.add(key, value)?;
        if let Some(bloom) = self.bloom.as_mut() {
            bloom.add(key);
        }
        if self.smallest_key.is_none() {
            self.smallest_key = Some(key.to_vec());
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        if self.data_block_builder.current_size() >= self.options.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    /// Encode a typed key and value through their codecs and add the cell.
    pub fn add_cell<K: DataType, V: DataType>(
        &mut self,
        key_codec: &K,
        key: &K::Value,
        value_codec: &V,
        value: &V::Value,
    ) -> Result<()> {
        let key = key_codec.encode_to_vec(key)?;
        let value = value_codec.encode_to_vec(value)?;
        self.add(&key, &value)
    }

    fn write_block(&mut self, raw: &[u8], block_type: BlockType, compression: CompressionType) -> Result<BlockHandle> {
        let framed = block::seal(raw, block_type, compression)?;
        self.writer.write_all(&framed)?;
        let handle = BlockHandle::new(self.offset, framed.len() as u64);
        self.offset += framed.len() as u64;
        Ok(handle)
    }

    /// Flush the current data block to disk
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block_builder.is_empty() {
            return Ok(());
        }

        let builder = std::mem::replace(
            &mut self.data_block_builder,
            BlockBuilder::new(self.options.restart_interval),
        );
        let raw = builder.finish();
        let handle = self.write_block(&raw, BlockType::Data, self.options.compression)?;
        self.index_block_builder.add_entry(&IndexEntry::new(self.last_key.clone(), handle))?;
        self.num_data_blocks += 1;

        if let Some(config) = self.cache.as_ref().filter(|c| c.cache_on_write) {
            if let Some(cache) = config.cache() {
                cache.insert_block(
                    CacheKey::new(Arc::clone(&self.file_name), handle.offset),
                    config.deserializers.data_id(),
                    Arc::new(DataBlock(Block::new(raw)?)),
                );
            }
        }
        Ok(())
    }

    /// Finish the file: flush the last data block, then write the bloom
    /// block, the index block and the footer.
    pub fn finish(mut self) -> Result<FileInfo> {
        self.flush_data_block()?;

        let bloom_handle = match self.bloom.take() {
            Some(bloom) => Some(self.write_block(&bloom.encode(), BlockType::Bloom, CompressionType::None)?),
            None => None,
        };

        let index_builder = std::mem::take(&mut self.index_block_builder);
        let index_handle = self.write_block(&index_builder.finish(), BlockType::Index, CompressionType::None)?;

        Footer::new(bloom_handle, index_handle, self.num_entries).write_to(&mut self.writer)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let file_size = self.offset + FOOTER_SIZE as u64;
        log::debug!(
            "Finished storage file {} ({} entries, {} data blocks, {} bytes)",
            self.file_name,
            self.num_entries,
            self.num_data_blocks,
            file_size
        );

        let largest_key = (self.num_entries > 0).then(|| std::mem::take(&mut self.last_key));
        Ok(FileInfo {
            path: self.path,
            file_size,
            num_entries: self.num_entries,
            num_data_blocks: self.num_data_blocks,
            smallest_key: self.smallest_key,
            largest_key,
        })
    }

    /// Abandon the file and remove what was written so far.
    pub fn abandon(self) -> Result<()> {
        let Self { writer, path, .. } = self;
        drop(writer);
        fs::remove_file(&path)?;
        log::debug!("Abandoned storage file {}", path.display());
        Ok(())
    }

    /// Get the number of entries added
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Approximate file size so far
    pub fn current_size(&self) -> u64 {
        self.offset + self.data_block_builder.current_size() as u64
    }

    /// Name under which this file's blocks are cached
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

//! Storage-file reader.
//!
//! A [`StorageFileReader`] is a [`ReaderCore`] (footer, index, bloom block,
//! block loading through the shared cache) composed with an
//! [`AccessStrategy`] chosen by [`AccessMode`].
//!
//! Block loading checks the cache first. A cold entry is rehydrated through
//! the deserializer registry; if its deserializer is gone, or the cached
//! bytes do not decode, the entry is evicted and the block is read from the
//! file instead.

use crate::cache::{BlockCache, Cacheable, CacheKey};
use crate::config::{AccessMode, ReaderOptions};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::sfile::block::{self, Block, BlockIterator};
use crate::sfile::cacheable::{BloomBlock, CacheConfig, DataBlock};
use crate::sfile::cell::Cell;
use crate::sfile::footer::{BlockHandle, Footer};
use crate::sfile::index::IndexBlock;
use crate::sfile::strategy::{AccessStrategy, PrefetchStrategy, StreamStrategy};
use crate::sfile::{BlockType, FOOTER_SIZE};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Positioned reads over the open file handle.
#[derive(Debug)]
struct FsBlockReader {
    file_name: Arc<str>,
    file: Mutex<Option<File>>,
    file_size: u64,
}

impl FsBlockReader {
    fn open(path: &Path, file_name: Arc<str>) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file_name, file: Mutex::new(Some(file)), file_size })
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let in_bounds = offset.checked_add(len as u64).is_some_and(|end| end <= self.file_size);
        if !in_bounds {
            return Err(Error::corruption(format!(
                "Read of {} bytes at offset {} past end of {} ({} bytes)",
                len, offset, self.file_name, self.file_size
            )));
        }

        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::invalid_state(format!("Streams of {} are closed", self.file_name)))?;

        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| Error::block_read(&self.file_name, offset, e))?;
        Ok(buf)
    }

    fn read_block(&self, handle: &BlockHandle) -> Result<Vec<u8>> {
        let len = usize::try_from(handle.size)
            .map_err(|_| Error::corruption(format!("Block size {} too large", handle.size)))?;
        self.read_at(handle.offset, len)
    }

    fn close(&self) {
        self.file.lock().take();
    }

    fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }
}

/// State shared by every access strategy: the open file, its metadata
/// blocks, and block loading through the cache.
#[derive(Debug)]
pub struct ReaderCore {
    path: PathBuf,
    fs: FsBlockReader,
    footer: Footer,
    index: IndexBlock,
    bloom: Option<BloomBlock>,
    cache_config: CacheConfig,
    options: ReaderOptions,
    closed: AtomicBool,
}

impl ReaderCore {
    fn open(path: &Path, cache_config: CacheConfig, options: ReaderOptions) -> Result<Self> {
        let file_name: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        let fs = FsBlockReader::open(path, Arc::clone(&file_name))?;
        if fs.file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption(format!("{} is too small to be a storage file", file_name)));
        }

        let footer_bytes = fs.read_at(fs.file_size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_bytes)?;

        let mut core = Self {
            path: path.to_path_buf(),
            fs,
            footer,
            index: IndexBlock::default(),
            bloom: None,
            cache_config,
            options,
            closed: AtomicBool::new(false),
        };

        let index_handle = core.footer.index_handle;
        core.index = core.load(&index_handle, BlockType::Index, true, IndexBlock::new)?;
        if let Some(bloom_handle) = core.footer.bloom_handle {
            core.bloom = Some(core.load(&bloom_handle, BlockType::Bloom, true, BloomBlock::decode)?);
        }
        Ok(core)
    }

    /// Load a block of type `T`, from the cache when possible.
    fn load<T>(
        &self,
        handle: &BlockHandle,
        block_type: BlockType,
        cache_on_miss: bool,
        parse: impl FnOnce(Bytes) -> Result<T>,
    ) -> Result<T>
    where
        T: Cacheable + Clone + 'static,
    {
        let cache = self.cache_config.cache();
        let key = CacheKey::new(self.fs.file_name.clone(), handle.offset);

        if let Some(cache) = cache {
            if let Some(hit) = self.cached::<T>(cache, &key) {
                return Ok(hit);
            }
        }

        let framed = self.fs.read_block(handle)?;
        let payload = block::unseal(&framed, block_type, self.options.verify_checksums)?;
        let parsed = parse(payload)?;

        if let Some(cache) = cache.filter(|_| cache_on_miss) {
            let id = self.cache_config.deserializers.id_for(block_type);
            cache.insert_block(key, id, Arc::new(parsed.clone()));
        }
        Ok(parsed)
    }

    /// Cache lookup that treats an unusable entry as a miss.
    fn cached<T: Cacheable + Clone + 'static>(&self, cache: &BlockCache, key: &CacheKey) -> Option<T> {
        match cache.get_block(key, self.cache_config.registry()) {
            Ok(None) => None,
            Ok(Some(block)) => match block.as_any().downcast_ref::<T>() {
                Some(typed) => Some(typed.clone()),
                None => {
                    log::warn!(
                        "Cached block at {}@{} has unexpected type {:?}, re-reading",
                        key.file,
                        key.offset,
                        block.block_type()
                    );
                    cache.evict(key);
                    None
                }
            },
            Err(e) => {
                log::warn!("Cached block at {}@{} is unusable ({}), re-reading", key.file, key.offset, e);
                cache.evict(key);
                None
            }
        }
    }

    fn data_handle(&self, block_index: usize) -> Result<BlockHandle> {
        self.index
            .entry(block_index)
            .map(|e| e.handle)
            .ok_or_else(|| Error::invalid_argument(format!("No data block {}", block_index)))
    }

    /// Load data block `block_index`.
    pub(crate) fn data_block(&self, block_index: usize) -> Result<Block> {
        let handle = self.data_handle(block_index)?;
        let block = self.load(&handle, BlockType::Data, self.cache_config.cache_data_on_read, |bytes| {
            Ok(DataBlock(Block::new(bytes)?))
        })?;
        Ok(block.0)
    }

    /// Load data block `block_index` into the cache.
    pub(crate) fn prefetch_block(&self, block_index: usize) -> Result<()> {
        let handle = self.data_handle(block_index)?;
        self.load(&handle, BlockType::Data, true, |bytes| Ok(DataBlock(Block::new(bytes)?)))?;
        Ok(())
    }

    /// True if data block `block_index` is resident in the cache.
    pub(crate) fn is_block_cached(&self, block_index: usize) -> bool {
        match (self.cache(), self.index.entry(block_index)) {
            (Some(cache), Some(entry)) => {
                cache.contains(&CacheKey::new(self.fs.file_name.clone(), entry.handle.offset))
            }
            _ => false,
        }
    }

    /// The shared cache, when caching is enabled.
    pub fn cache(&self) -> Option<&Arc<BlockCache>> {
        self.cache_config.cache()
    }

    /// Name under which this file's blocks are cached.
    pub fn file_name(&self) -> &str {
        &self.fs.file_name
    }

    /// Number of data blocks.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// True once the owning reader has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the file handle. Later block reads fail.
    pub fn close_streams(&self) {
        self.fs.close();
    }

    /// True while the file handle is open.
    pub fn streams_open(&self) -> bool {
        self.fs.is_open()
    }
}

/// StorageFileReader provides read access to a storage file.
///
/// Usage:
/// ```no_run
/// use cellfile::cache::DeserializerRegistry;
/// use cellfile::config::ReaderOptions;
/// use cellfile::sfile::{BlockDeserializers, CacheConfig, StorageFileReader};
/// use std::sync::Arc;
///
/// let kinds = BlockDeserializers::register(Arc::new(DeserializerRegistry::new()));
/// let reader =
///     StorageFileReader::open("cells.sf", CacheConfig::disabled(kinds), ReaderOptions::default())
///         .unwrap();
/// if let Some(value) = reader.get(b"key1").unwrap() {
///     println!("Found: {:?}", value);
/// }
/// reader.close(false).unwrap();
/// ```
#[derive(Debug)]
pub struct StorageFileReader {
    core: Arc<ReaderCore>,
    strategy: Box<dyn AccessStrategy>,
}

impl StorageFileReader {
    /// Open a storage file for reading.
    pub fn open<P: AsRef<Path>>(path: P, cache_config: CacheConfig, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let mode = options.access_mode;
        let depth = options.prefetch_depth;
        let prefetch_on_open = options.prefetch_on_open;

        let core = Arc::new(ReaderCore::open(path.as_ref(), cache_config, options)?);
        let strategy: Box<dyn AccessStrategy> = match mode {
            AccessMode::Stream => Box::new(StreamStrategy),
            AccessMode::Prefetch => {
                Box::new(PrefetchStrategy::start(Arc::clone(&core), depth, prefetch_on_open)?)
            }
        };

        let reader = Self { core, strategy };
        reader.strategy.on_open(&reader.core)?;
        log::info!(
            "Opened storage file {} ({:?}, {} data blocks)",
            reader.core.file_name(),
            mode,
            reader.core.num_blocks()
        );
        Ok(reader)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.core.is_closed() {
            return Err(Error::invalid_state(format!("Reader for {} is closed", self.core.file_name())));
        }
        Ok(())
    }

    fn read_data_block(&self, block_index: usize) -> Result<Block> {
        self.ensure_open()?;
        let block = self.core.data_block(block_index)?;
        self.strategy.after_block_read(&self.core, block_index);
        Ok(block)
    }

    /// Get the value for a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if !self.may_contain(key)? {
            return Ok(None);
        }
        match self.core.index.find_block_index(key) {
            Some(block_index) => self.read_data_block(block_index)?.get(key),
            None => Ok(None),
        }
    }

    /// False when the bloom block rules `key` out.
    pub fn may_contain(&self, key: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        Ok(match &self.core.bloom {
            Some(bloom) => bloom.filter().may_contain(key),
            None => true,
        })
    }

    /// Iterate over every cell in key order.
    pub fn scanner(&self) -> Scanner<'_> {
        Scanner::new(self, 0, None)
    }

    /// Iterate over cells with key >= `start`, in key order.
    pub fn scanner_from(&self, start: &[u8]) -> Scanner<'_> {
        match self.core.index.find_block_index(start) {
            Some(block_index) => Scanner::new(self, block_index, Some(start.to_vec())),
            None => Scanner::new(self, self.core.num_blocks(), None),
        }
    }

    /// First key in the file.
    pub fn smallest_key(&self) -> Result<Option<Vec<u8>>> {
        if self.core.num_blocks() == 0 {
            self.ensure_open()?;
            return Ok(None);
        }
        let block = self.read_data_block(0)?;
        let mut iter = block.iter();
        iter.seek_to_first();
        if iter.advance() {
            return Ok(Some(iter.key().to_vec()));
        }
        iter.status()?;
        Ok(None)
    }

    /// Last key in the file.
    pub fn largest_key(&self) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.core.index.entries().last().map(|e| e.key.clone()))
    }

    /// Number of data blocks.
    pub fn num_blocks(&self) -> usize {
        self.core.num_blocks()
    }

    /// Number of cells, as recorded in the footer.
    pub fn num_entries(&self) -> u64 {
        self.core.footer.num_entries
    }

    /// File size in bytes.
    pub fn file_size(&self) -> u64 {
        self.core.fs.file_size
    }

    /// Name under which this file's blocks are cached.
    pub fn file_name(&self) -> &str {
        self.core.file_name()
    }

    /// Path the reader was opened with.
    pub fn path(&self) -> &Path {
        &self.core.path
    }

    /// Access mode of this reader.
    pub fn mode(&self) -> AccessMode {
        self.strategy.mode()
    }

    /// True once no prefetch work is outstanding. Always true when
    /// streaming.
    pub fn is_prefetch_complete(&self) -> bool {
        self.strategy.is_idle()
    }

    /// True after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Close the reader.
    ///
    /// `evict_on_close` (or the cache config's flag) asks for this file's
    /// blocks to be evicted from the shared cache; only a prefetching
    /// reader does so. Closing twice fails with `InvalidState`.
    pub fn close(&self, evict_on_close: bool) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::invalid_state(format!(
                "Reader for {} is already closed",
                self.core.file_name()
            )));
        }
        let evict = evict_on_close || self.core.cache_config.evict_on_close;
        self.strategy.close(&self.core, evict)?;
        log::info!("Closed storage file {} (evict_on_close: {})", self.core.file_name(), evict);
        Ok(())
    }
}

impl Drop for StorageFileReader {
    fn drop(&mut self) {
        if !self.core.closed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.strategy.close(&self.core, false) {
                log::warn!("Error closing {} on drop: {}", self.core.file_name(), e);
            }
        }
    }
}

/// Iterator over the cells of a storage file, in key order.
///
/// Yields an error and stops if a block cannot be read.
pub struct Scanner<'a> {
    reader: &'a StorageFileReader,
    next_block: usize,
    current: Option<BlockIterator>,
    start: Option<Vec<u8>>,
    done: bool,
}

impl<'a> Scanner<'a> {
    fn new(reader: &'a StorageFileReader, first_block: usize, start: Option<Vec<u8>>) -> Self {
        Self { reader, next_block: first_block, current: None, start, done: false }
    }

    fn next_cell(&mut self) -> Result<Option<Cell>> {
        loop {
            if let Some(iter) = self.current.as_mut() {
                if iter.advance() {
                    return Ok(Some(Cell::new(Bytes::copy_from_slice(iter.key()), iter.value_bytes())));
                }
                iter.status()?;
                self.current = None;
            }

            if self.next_block >= self.reader.num_blocks() {
                return Ok(None);
            }
            let block = self.reader.read_data_block(self.next_block)?;
            self.next_block += 1;

            let mut iter = block.iter();
            match self.start.take() {
                Some(start) => {
                    if iter.seek(&start)? {
                        let cell = Cell::new(Bytes::copy_from_slice(iter.key()), iter.value_bytes());
                        self.current = Some(iter);
                        return Ok(Some(cell));
                    }
                }
                None => iter.seek_to_first(),
            }
            self.current = Some(iter);
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_cell() {
            Ok(Some(cell)) => Some(Ok(cell)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

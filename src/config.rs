//! Configuration options for storage-file readers and writers.

use crate::error::{Error, Result};

/// How a reader fetches data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read blocks inline as they are needed.
    #[default]
    Stream,
    /// Read blocks ahead of demand on a background worker.
    Prefetch,
}

/// Options for opening a storage file.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Block access strategy.
    /// Default: AccessMode::Stream
    pub access_mode: AccessMode,

    /// Number of data blocks the prefetch worker reads past the last one
    /// requested.
    /// Default: 2
    pub prefetch_depth: usize,

    /// Queue every data block for prefetch as soon as the file is open.
    /// Only used in prefetch mode.
    /// Default: false
    pub prefetch_on_open: bool,

    /// Verify the CRC32 of every block read from disk.
    /// Default: true
    pub verify_checksums: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::Stream,
            prefetch_depth: 2,
            prefetch_on_open: false,
            verify_checksums: true,
        }
    }
}

impl ReaderOptions {
    /// Creates a new ReaderOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for prefetch-mode options.
    pub fn prefetch() -> Self {
        Self::default().access_mode(AccessMode::Prefetch)
    }

    /// Sets the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Sets the prefetch depth.
    pub fn prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Sets whether every block is prefetched at open.
    pub fn prefetch_on_open(mut self, value: bool) -> Self {
        self.prefetch_on_open = value;
        self
    }

    /// Enables or disables checksum verification.
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.access_mode == AccessMode::Prefetch
            && self.prefetch_depth == 0
            && !self.prefetch_on_open
        {
            return Err(Error::invalid_argument(
                "prefetch mode needs prefetch_depth > 0 or prefetch_on_open",
            ));
        }
        Ok(())
    }
}

/// Options for writing a storage file.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Target size of a data block before it is flushed (in bytes).
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points in a data block.
    /// Default: 16
    pub restart_interval: usize,

    /// Compression applied to data blocks.
    /// Default: CompressionType::Snappy when the `snappy` feature is on
    pub compression: CompressionType,

    /// Write a bloom filter block over all keys.
    /// Default: true
    pub use_bloom_filter: bool,

    /// Number of keys the bloom filter is sized for.
    /// Default: 10000
    pub expected_keys: usize,

    /// Bloom filter false positive rate.
    /// Default: 0.01 (1%)
    pub bloom_fp_rate: f64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            restart_interval: 16,
            compression: CompressionType::default(),
            use_bloom_filter: true,
            expected_keys: 10_000,
            bloom_fp_rate: 0.01,
        }
    }
}

impl WriterOptions {
    /// Creates a new WriterOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval.
    pub fn restart_interval(mut self, interval: usize) -> Self {
        self.restart_interval = interval;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Enables or disables the bloom filter block.
    pub fn use_bloom_filter(mut self, value: bool) -> Self {
        self.use_bloom_filter = value;
        self
    }

    /// Sets the number of keys the bloom filter is sized for.
    pub fn expected_keys(mut self, keys: usize) -> Self {
        self.expected_keys = keys;
        self
    }

    /// Sets the bloom filter false positive rate.
    pub fn bloom_fp_rate(mut self, rate: f64) -> Self {
        self.bloom_fp_rate = rate;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_argument("block_size must be > 0"));
        }
        if self.restart_interval == 0 {
            return Err(Error::invalid_argument("restart_interval must be > 0"));
        }
        if self.bloom_fp_rate <= 0.0 || self.bloom_fp_rate >= 1.0 {
            return Err(Error::invalid_argument("bloom_fp_rate must be between 0 and 1"));
        }
        Ok(())
    }
}

/// Compression algorithms for storage-file blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Compress a block payload.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionType::None => Ok(data.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::invalid_state(format!("Snappy compression failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => lz4::block::compress(data, None, true)
                .map_err(|e| Error::invalid_state(format!("LZ4 compression failed: {}", e))),
        }
    }

    /// Decompress a block payload.
    ///
    /// Malformed input is reported as corruption.
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionType::None => Ok(data.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| Error::corruption(format!("Snappy decompression failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => lz4::block::decompress(data, None)
                .map_err(|e| Error::corruption(format!("LZ4 decompression failed: {}", e))),
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

//! # cellfile - Sorted Storage Files with Order-Preserving Codecs
//!
//! cellfile is the on-disk key-value layer of a column-family store. Cells are
//! encoded with order-preserving binary codecs, written into immutable sorted
//! block files, and read back through a shared block cache that can be saved
//! and restored across process restarts.
//!
//! ## Architecture
//!
//! - **Codecs** ([`types`]): typed values to bytes whose unsigned
//!   lexicographic order matches the values' natural order
//! - **Storage files** ([`sfile`]): writer, streaming and prefetching readers
//! - **Block cache** ([`cache`]): LRU of decoded and serialized blocks, keyed
//!   by file and offset
//! - **Deserializer registry** ([`cache::DeserializerRegistry`]): 4-byte ids
//!   that tell a restored cache how to rebuild each block
//! - **Bloom filter** ([`filter`]): rules files out before any block read
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cellfile::cache::{BlockCache, DeserializerRegistry};
//! use cellfile::config::{ReaderOptions, WriterOptions};
//! use cellfile::sfile::{BlockDeserializers, CacheConfig, StorageFileReader, StorageFileWriter};
//! use cellfile::types::{Order, OrderedFloat64, RawBytes};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), cellfile::Error> {
//! let registry = Arc::new(DeserializerRegistry::new());
//! let kinds = BlockDeserializers::register(Arc::clone(&registry));
//! let cache = Arc::new(BlockCache::new(8 * 1024 * 1024));
//! let config = CacheConfig::new(cache, kinds);
//!
//! // Write cells keyed by an ordered float
//! let keys = OrderedFloat64::new(Order::Ascending);
//! let values = RawBytes::new(Order::Ascending);
//! let mut writer = StorageFileWriter::create("prices.sf", WriterOptions::default())?;
//! writer.add_cell(&keys, &-2.5, &values, &b"down"[..])?;
//! writer.add_cell(&keys, &255.0, &values, &b"up"[..])?;
//! writer.finish()?;
//!
//! // Read them back in key order
//! let reader = StorageFileReader::open("prices.sf", config, ReaderOptions::default())?;
//! for cell in reader.scanner() {
//!     let cell = cell?;
//!     println!("{} => {:?}", cell.decode_key(&keys)?, cell.value);
//! }
//! reader.close(false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod sfile;
pub mod types;

// Re-exports
pub use cache::{BlockCache, DeserializerRegistry};
pub use config::{AccessMode, CompressionType, ReaderOptions, WriterOptions};
pub use error::{Error, Result};
pub use sfile::{CacheConfig, Cell, StorageFileReader, StorageFileWriter};
pub use types::{DataType, Order, PositionedBuffer};

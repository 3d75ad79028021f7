//! Storage files: immutable, sorted, block-structured key-value files.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! ...
//! [Data Block N]
//! [Bloom Block]     // optional
//! [Index Block]     // last key of each data block -> handle
//! [Footer: 48B]     // bloom handle, index handle, entry count, magic
//! ```
//!
//! ## Block Framing
//!
//! ```text
//! [payload][block_type: u8][compression: u8][crc32(payload): u32 le]
//! ```
//!
//! The checksum covers the payload as written, after compression. The block
//! type lets a reader reject a handle that points at the wrong kind of block.
//!
//! Data and index blocks use the prefix-compressed restart-point layout in
//! [`block`]; the bloom block is an encoded [`BloomFilter`](crate::filter::BloomFilter).

pub mod block;
pub mod cacheable;
pub mod cell;
pub mod footer;
pub mod index;
pub mod reader;
pub mod strategy;
pub mod writer;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use cacheable::{BlockDeserializers, BloomBlock, CacheConfig, DataBlock};
pub use cell::Cell;
pub use footer::{BlockHandle, Footer};
pub use index::{IndexBlock, IndexBlockBuilder, IndexEntry};
pub use reader::{Scanner, StorageFileReader};
pub use strategy::{AccessStrategy, PrefetchStrategy, StreamStrategy};
pub use writer::{FileInfo, StorageFileWriter};

pub use crate::config::CompressionType;

use crate::error::{Error, Result};

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 48;

/// Block trailer: block type (1) + compression (1) + crc32 (4)
pub const BLOCK_TRAILER_SIZE: usize = 6;

/// Magic number for storage files
pub const MAGIC_NUMBER: u64 = 0x5346_494c_4543_454c; // "SFILECEL"

/// Kind of block, recorded in each block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    /// Sorted cells
    Data = 1,
    /// Bloom filter over all row keys
    Bloom = 2,
    /// Last key of each data block
    Index = 3,
}

impl BlockType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(BlockType::Data),
            2 => Some(BlockType::Bloom),
            3 => Some(BlockType::Index),
            _ => None,
        }
    }

    /// Like [`from_u8`](Self::from_u8), but an unknown tag is corruption.
    pub fn try_from_u8(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or_else(|| Error::corruption(format!("Invalid block type: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_tags() {
        for ty in [BlockType::Data, BlockType::Bloom, BlockType::Index] {
            assert_eq!(BlockType::from_u8(ty as u8), Some(ty));
        }
        assert_eq!(BlockType::from_u8(0), None);
        assert!(BlockType::try_from_u8(9).unwrap_err().is_corruption());
    }
}

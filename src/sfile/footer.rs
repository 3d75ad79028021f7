//! Storage-file footer implementation.
//!
//! The footer is a fixed-size (48 bytes) structure at the end of a storage file
//! that points at the index block and the optional bloom block.

use crate::error::{Error, Result};
use crate::sfile::{FOOTER_SIZE, MAGIC_NUMBER};
use std::io::Write;

/// Encoded size of a [`BlockHandle`].
pub const BLOCK_HANDLE_SIZE: usize = 16;

fn read_u64_le(data: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// BlockHandle points at a framed block in the file.
///
/// `size` covers the payload and its trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the block in bytes, trailer included
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Encode the BlockHandle to bytes (16 bytes: 8 for offset + 8 for size)
    pub fn encode(&self) -> [u8; BLOCK_HANDLE_SIZE] {
        let mut buf = [0u8; BLOCK_HANDLE_SIZE];
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode a BlockHandle from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HANDLE_SIZE {
            return Err(Error::corruption("BlockHandle too short"));
        }
        Ok(Self { offset: read_u64_le(data, 0), size: read_u64_le(data, 8) })
    }

    /// Get the end offset of this block
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Footer is the last 48 bytes of a storage file.
///
/// Format:
/// ```text
/// [bloom_handle: 16 bytes]   // size 0 when the file has no bloom block
/// [index_handle: 16 bytes]
/// [num_entries: 8 bytes]
/// [magic: 8 bytes]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the bloom block, if one was written
    pub bloom_handle: Option<BlockHandle>,
    /// Handle to the index block
    pub index_handle: BlockHandle,
    /// Number of cells in the file
    pub num_entries: u64,
}

impl Footer {
    /// Create a new Footer
    pub fn new(bloom_handle: Option<BlockHandle>, index_handle: BlockHandle, num_entries: u64) -> Self {
        Self { bloom_handle, index_handle, num_entries }
    }

    /// Encode the footer to bytes (48 bytes)
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        let bloom = self.bloom_handle.unwrap_or(BlockHandle::new(0, 0));
        buf[0..16].copy_from_slice(&bloom.encode());
        buf[16..32].copy_from_slice(&self.index_handle.encode());
        buf[32..40].copy_from_slice(&self.num_entries.to_le_bytes());
        buf[40..48].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf
    }

    /// Decode a footer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let magic = read_u64_le(data, 40);
        if magic != MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "Invalid storage file magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER, magic
            )));
        }

        let bloom = BlockHandle::decode(&data[0..16])?;
        let index_handle = BlockHandle::decode(&data[16..32])?;
        let num_entries = read_u64_le(data, 32);

        Ok(Self {
            bloom_handle: if bloom.size == 0 { None } else { Some(bloom) },
            index_handle,
            num_entries,
        })
    }

    /// Write the footer to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }
}

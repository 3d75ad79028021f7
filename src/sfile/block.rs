//! Block format implementation for storage files.
//!
//! A block contains multiple key-value entries and uses restart points
//! for binary search and prefix compression. On disk each block is followed
//! by a trailer naming its type and compression, and a checksum.

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::sfile::{BlockType, BLOCK_TRAILER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of an entry header: shared, unshared and value lengths.
const ENTRY_HEADER_SIZE: usize = 12;

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let raw = data.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Block stores key-value pairs with prefix compression.
///
/// Format:
/// ```text
/// [Entry 1]
/// [Entry 2]
/// ...
/// [Entry N]
/// [Restart Point 1: u32]
/// ...
/// [Restart Point M: u32]
/// [Num Restarts: u32]
/// ```
///
/// Each entry format:
/// ```text
/// [shared_key_len: u32]     // Length of shared prefix with previous key
/// [unshared_key_len: u32]   // Length of unshared key suffix
/// [value_len: u32]          // Length of value
/// [unshared_key: bytes]     // Key suffix
/// [value: bytes]            // Value data
/// ```
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Create a new Block from raw (decompressed) data
    pub fn new(data: Bytes) -> Result<Self> {
        let len = data.len();
        let num_restarts = match len.checked_sub(4).and_then(|at| read_u32_le(&data, at)) {
            Some(n) => n,
            None => return Err(Error::corruption("Block too small")),
        };

        // restart_offset = data_len - 4 (num_restarts) - 4 * num_restarts
        let restart_offset = (num_restarts as usize)
            .checked_mul(4)
            .and_then(|restarts_len| (len - 4).checked_sub(restarts_len))
            .ok_or_else(|| Error::corruption("Invalid restart offset"))?;

        if num_restarts == 0 && restart_offset != 0 {
            return Err(Error::corruption("Block has entries but no restart points"));
        }

        let block = Self { data, restart_offset, num_restarts };
        for i in 0..num_restarts {
            if block.restart_point(i) as usize > restart_offset {
                return Err(Error::corruption("Restart point past end of entries"));
            }
        }
        Ok(block)
    }

    /// Get the number of restart points
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Get a restart point by index. Bounds are checked in [`Block::new`].
    fn restart_point(&self, index: u32) -> u32 {
        read_u32_le(&self.data, self.restart_offset + index as usize * 4).unwrap_or(u32::MAX)
    }

    /// Create an iterator over the block
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.clone())
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let mut iter = self.iter();
        if iter.seek(key)? && iter.key() == key {
            return Ok(Some(iter.value_bytes()));
        }
        Ok(None)
    }

    /// True if the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.restart_offset == 0
    }

    /// Get the raw data
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// BlockBuilder builds a block with prefix compression.
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
    num_entries: usize,
    block_restart_interval: usize,
}

impl BlockBuilder {
    /// Create a new BlockBuilder
    pub fn new(block_restart_interval: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            // First restart point at offset 0
            restarts: vec![0],
            counter: 0,
            last_key: Vec::new(),
            num_entries: 0,
            block_restart_interval: block_restart_interval.max(1),
        }
    }

    /// Add a key-value pair to the block.
    ///
    /// Keys must be non-empty and strictly increasing.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("Key cannot be empty"));
        }
        if self.num_entries > 0 && key <= self.last_key.as_slice() {
            return Err(Error::invalid_argument("Keys must be added in sorted order"));
        }

        let mut shared = 0;

        // Add a restart point if needed
        if self.counter >= self.block_restart_interval {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        } else {
            shared = shared_prefix_len(&self.last_key, key);
        }

        let unshared = key.len() - shared;

        // Write entry: shared | unshared | value_len | key_suffix | value
        self.buffer.put_u32_le(shared as u32);
        self.buffer.put_u32_le(unshared as u32);
        self.buffer.put_u32_le(value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
        self.num_entries += 1;
        Ok(())
    }

    /// Finish building and return the block data
    pub fn finish(mut self) -> Bytes {
        for restart in &self.restarts {
            self.buffer.put_u32_le(*restart);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);
        self.buffer.freeze()
    }

    /// Get the current size of the block
    pub fn current_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Check if the block is empty
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Number of entries added so far
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Last key added
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Iterator over entries in a block.
///
/// Starts positioned before the first entry; each [`advance`](Self::advance)
/// parses one entry.
pub struct BlockIterator {
    block: Block,
    current: usize,
    key: Vec<u8>,
    value_start: usize,
    value_end: usize,
    valid: bool,
    corrupt: bool,
}

impl BlockIterator {
    fn new(block: Block) -> Self {
        Self {
            block,
            current: 0,
            key: Vec::new(),
            value_start: 0,
            value_end: 0,
            valid: false,
            corrupt: false,
        }
    }

    /// Seek to before the first entry
    pub fn seek_to_first(&mut self) {
        self.seek_to_restart_point(0);
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.valid = false;
        self.current =
            if self.block.num_restarts == 0 { 0 } else { self.block.restart_point(index) as usize };
    }

    /// Position on the first entry with key >= `target`.
    ///
    /// Returns false when every key is smaller than `target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<bool> {
        // Binary search for the last restart point whose key is < target
        let mut left = 0;
        let mut right = self.block.num_restarts;
        while left < right {
            let mid = left + (right - left) / 2;
            self.seek_to_restart_point(mid);
            if !self.advance() {
                self.status()?;
                right = mid;
                continue;
            }
            if self.key.as_slice() < target {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        self.seek_to_restart_point(left.saturating_sub(1));
        while self.advance() {
            if self.key.as_slice() >= target {
                return Ok(true);
            }
        }
        self.status()?;
        Ok(false)
    }

    /// Move to the next entry
    pub fn advance(&mut self) -> bool {
        if self.corrupt {
            return false;
        }
        if self.current >= self.block.restart_offset {
            self.valid = false;
            return false;
        }
        match self.parse_entry() {
            Some(next) => {
                self.current = next;
                self.valid = true;
            }
            None => {
                self.corrupt = true;
                self.valid = false;
            }
        }
        self.valid
    }

    /// Parse the entry at `current`, returning the offset of the next one.
    fn parse_entry(&mut self) -> Option<usize> {
        let data = &self.block.data[..self.block.restart_offset];
        let at = self.current;

        let shared = read_u32_le(data, at)? as usize;
        let unshared = read_u32_le(data, at + 4)? as usize;
        let value_len = read_u32_le(data, at + 8)? as usize;

        let key_start = at.checked_add(ENTRY_HEADER_SIZE)?;
        let value_start = key_start.checked_add(unshared)?;
        let value_end = value_start.checked_add(value_len)?;
        if value_end > data.len() || shared > self.key.len() {
            return None;
        }

        self.key.truncate(shared);
        self.key.extend_from_slice(&data[key_start..value_start]);
        self.value_start = value_start;
        self.value_end = value_end;
        Some(value_end)
    }

    /// Check if the iterator is positioned on an entry
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Corruption error if an entry failed to parse
    pub fn status(&self) -> Result<()> {
        if self.corrupt {
            return Err(Error::corruption(format!("Malformed block entry at offset {}", self.current)));
        }
        Ok(())
    }

    /// Get the current key. Empty when not positioned on an entry.
    pub fn key(&self) -> &[u8] {
        if self.valid {
            &self.key
        } else {
            &[]
        }
    }

    /// Get the current value. Empty when not positioned on an entry.
    pub fn value(&self) -> &[u8] {
        if self.valid {
            &self.block.data[self.value_start..self.value_end]
        } else {
            &[]
        }
    }

    /// The current value as a zero-copy slice of the block.
    pub fn value_bytes(&self) -> Bytes {
        if self.valid {
            self.block.data.slice(self.value_start..self.value_end)
        } else {
            Bytes::new()
        }
    }
}

/// Frame a block payload for disk:
/// `[payload][block_type: u8][compression: u8][crc32(payload): u32 le]`.
///
/// The payload is compressed first; the checksum covers the compressed bytes.
pub fn seal(raw: &[u8], block_type: BlockType, compression: CompressionType) -> Result<Vec<u8>> {
    let mut framed = compression.compress(raw)?;
    let checksum = crc32fast::hash(&framed);
    framed.reserve(BLOCK_TRAILER_SIZE);
    framed.push(block_type as u8);
    framed.push(compression as u8);
    framed.extend_from_slice(&checksum.to_le_bytes());
    Ok(framed)
}

/// Undo [`seal`]: check the trailer, verify the checksum when asked, and
/// decompress.
pub fn unseal(framed: &[u8], expected: BlockType, verify_checksum: bool) -> Result<Bytes> {
    let payload_len = framed
        .len()
        .checked_sub(BLOCK_TRAILER_SIZE)
        .ok_or_else(|| Error::corruption("Block size too small"))?;
    let (payload, trailer) = framed.split_at(payload_len);

    let block_type = BlockType::try_from_u8(trailer[0])?;
    if block_type != expected {
        return Err(Error::corruption(format!(
            "Block type mismatch: expected {:?}, found {:?}",
            expected, block_type
        )));
    }

    let compression = CompressionType::from_u8(trailer[1])
        .ok_or_else(|| Error::corruption(format!("Invalid compression type: {}", trailer[1])))?;

    if verify_checksum {
        let stored = u32::from_le_bytes([trailer[2], trailer[3], trailer[4], trailer[5]]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(Error::ChecksumMismatch { expected: stored, actual: computed });
        }
    }

    Ok(Bytes::from(compression.decompress(payload)?))
}

//! Bloom filter stored as a storage-file block.
//!
//! The filter is built over encoded row keys while a file is written and is
//! persisted as its own block, so readers can rule out a file without touching
//! its index or data blocks.

use crate::error::{Error, Result};
use crate::filter::Filter;

/// Default bits per key for bloom filter
const DEFAULT_BITS_PER_KEY: usize = 10;

/// Encoded header: num_hashes (u32) + num_bits (u64), both little-endian.
const HEADER_LEN: usize = 12;

const SEED_A: u32 = 0xbc9f1d34;
const SEED_B: u32 = 0xd0e89c7b;

/// BloomFilter provides probabilistic set membership testing.
///
/// # Example
/// ```
/// use cellfile::filter::{BloomFilter, Filter};
///
/// let mut filter = BloomFilter::new(1000, 0.01);
/// filter.add(b"row-1");
/// assert!(filter.may_contain(b"row-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_hashes: u32,
    num_bits: usize,
}

impl BloomFilter {
    /// Size a filter for `expected_keys` at the given false positive rate.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        if expected_keys == 0 {
            return Self::with_bits_and_hashes(64, 1);
        }

        // m = -n * ln(p) / ln(2)^2
        let n = expected_keys as f64;
        let p = false_positive_rate.clamp(0.0001, 0.9999);
        let num_bits = ((-n * p.ln() / 2.0_f64.ln().powi(2)).ceil() as usize).max(64);

        // k = (m / n) * ln(2)
        let k = ((num_bits as f64 / n) * 2.0_f64.ln()).ceil() as u32;

        Self::with_bits_and_hashes(num_bits, k.clamp(1, 30))
    }

    /// Size a filter with a fixed number of bits per key.
    pub fn with_bits_per_key(num_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = (num_keys * bits_per_key).max(64);
        let num_hashes = ((bits_per_key as f64) * 0.69).round() as u32;
        Self::with_bits_and_hashes(num_bits, num_hashes.clamp(1, 30))
    }

    /// Size a filter at the default ten bits per key.
    pub fn default_with_keys(num_keys: usize) -> Self {
        Self::with_bits_per_key(num_keys, DEFAULT_BITS_PER_KEY)
    }

    fn with_bits_and_hashes(num_bits: usize, num_hashes: u32) -> Self {
        Self { bits: vec![0u8; num_bits.div_ceil(8)], num_hashes, num_bits }
    }

    /// Double hashing: probe i lands on `h1 + i * h2 (mod m)`.
    fn probes(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = fnv1a(key, SEED_A);
        let h2 = fnv1a(key, SEED_B);
        let m = self.num_bits;
        (0..self.num_hashes).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) as usize) % m)
    }

    /// Size of the bit array in bytes.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Number of probes per key.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of addressable bits.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Theoretical false positive rate `(1 - e^(-kn/m))^k` after `num_keys`
    /// insertions.
    pub fn estimated_false_positive_rate(&self, num_keys: usize) -> f64 {
        if num_keys == 0 {
            return 0.0;
        }
        let k = self.num_hashes as f64;
        let n = num_keys as f64;
        let m = self.num_bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

impl Filter for BloomFilter {
    fn may_contain(&self, key: &[u8]) -> bool {
        self.probes(key).all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    fn add(&mut self, key: &[u8]) {
        let positions: Vec<usize> = self.probes(key).collect();
        for pos in positions {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Format: `[num_hashes: u32 le][num_bits: u64 le][bits]`
    fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(HEADER_LEN + self.bits.len());
        encoded.extend_from_slice(&self.num_hashes.to_le_bytes());
        encoded.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        encoded.extend_from_slice(&self.bits);
        encoded
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::corruption("Bloom filter data too short"));
        }

        let num_hashes = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let mut num_bits_raw = [0u8; 8];
        num_bits_raw.copy_from_slice(&data[4..12]);
        let num_bits = u64::from_le_bytes(num_bits_raw) as usize;

        if num_bits == 0 || num_hashes == 0 {
            return Err(Error::corruption("Bloom filter header is empty"));
        }
        if data.len() != HEADER_LEN + num_bits.div_ceil(8) {
            return Err(Error::corruption("Bloom filter size mismatch"));
        }

        Ok(Self { bits: data[HEADER_LEN..].to_vec(), num_hashes, num_bits })
    }
}

/// FNV-1a folded to 32 bits, with the seed mixed into the offset basis.
fn fnv1a(key: &[u8], seed: u32) -> u32 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut state = OFFSET_BASIS ^ seed as u64;
    for &byte in key {
        state ^= byte as u64;
        state = state.wrapping_mul(PRIME);
    }
    (state ^ (state >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_no_false_negatives() {
        let mut filter = BloomFilter::new(1000, 0.01);
        let keys: Vec<Vec<u8>> = (0..1000).map(|i| format!("key{}", i).into_bytes()).collect();

        for key in &keys {
            filter.add(key);
        }
        for key in &keys {
            assert!(filter.may_contain(key), "false negative for {:?}", String::from_utf8_lossy(key));
        }
    }

    #[test]
    fn test_bloom_filter_false_positive_rate() {
        let num_keys = 10000;
        let target_fp_rate = 0.01;
        let mut filter = BloomFilter::new(num_keys, target_fp_rate);

        for i in 0..num_keys {
            filter.add(format!("key{}", i).as_bytes());
        }

        let false_positives = (num_keys..num_keys * 2)
            .filter(|i| filter.may_contain(format!("key{}", i).as_bytes()))
            .count();
        let actual = false_positives as f64 / num_keys as f64;

        // Allow 3x the target for hash quality on sequential keys.
        assert!(actual < target_fp_rate * 3.0, "false positive rate too high: {:.4}", actual);
    }

    #[test]
    fn test_bloom_filter_encode_decode() {
        let mut filter = BloomFilter::new(100, 0.01);
        filter.add(b"key1");
        filter.add(b"key2");

        let decoded = BloomFilter::decode(&filter.encode()).unwrap();
        assert_eq!(decoded, filter);
        assert!(decoded.may_contain(b"key1"));
        assert!(decoded.may_contain(b"key2"));
    }

    #[test]
    fn test_bloom_filter_decode_rejects_truncation() {
        let mut filter = BloomFilter::new(100, 0.01);
        filter.add(b"key1");
        let encoded = filter.encode();

        assert!(matches!(BloomFilter::decode(&encoded[..5]), Err(Error::Corruption(_))));
        assert!(matches!(
            BloomFilter::decode(&encoded[..encoded.len() - 1]),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_bloom_filter_empty() {
        let filter = BloomFilter::new(0, 0.01);
        assert!(!filter.may_contain(b"key1"));
    }

    #[test]
    fn test_bloom_filter_sizing() {
        let filter = BloomFilter::with_bits_per_key(100, 10);
        assert!(filter.num_bits() >= 1000);
        assert!(filter.num_hashes() > 0);

        let filter = BloomFilter::new(1000, 0.01);
        assert!(filter.size() > 0);
        assert!(filter.estimated_false_positive_rate(1000) < 0.02);
        assert_eq!(BloomFilter::default_with_keys(10).num_bits(), 100);
    }
}

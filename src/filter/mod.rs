//! Filter Module
//!
//! Probabilistic membership filters consulted before a data block is read.
//!
//! - If the filter says no, the key is DEFINITELY NOT in the data range
//! - If it says yes, the key is PROBABLY there (false positives possible)
//!
//! ## Bloom filter encoding
//! ```text
//! ┌──────────────────────────────┬──────────┐
//! │ bit array (ceil(bits/8))     │  k (u8)  │
//! └──────────────────────────────┴──────────┘
//! ```
//! Probes use double hashing: `h_i = h + i * delta` with
//! `delta = rotr(h, 17)`, from a single xxh3 hash of the key.

mod block;

use xxhash_rust::xxh3::xxh3_64;

pub use block::{FilterBlockBuilder, FilterBlockReader, FILTER_BASE_LG, STAGING_CAPACITY};

/// Builds and evaluates filters over a set of keys
pub trait FilterPolicy: Send + Sync {
    /// Name recorded for diagnostics
    fn name(&self) -> &'static str;

    /// Append a filter summarizing `keys` to `dst`
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// `false` only if `key` was definitely not among the keys of `filter`
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Standard bloom filter policy
#[derive(Debug, Clone)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    num_hashes: usize,
}

impl BloomFilterPolicy {
    /// `bits_per_key = 10` yields roughly a 1% false positive rate
    pub fn new(bits_per_key: usize) -> Self {
        // k = bits_per_key * ln(2), rounded down to limit probing cost
        let num_hashes = ((bits_per_key as f64) * 0.69) as usize;
        Self {
            bits_per_key,
            num_hashes: num_hashes.clamp(1, 30),
        }
    }

    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    let h = xxh3_64(key);
    (h ^ (h >> 32)) as u32
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "smrkv.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Small key counts would otherwise see a very high false positive rate
        let bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = bits.div_ceil(8);
        let bits = bytes * 8;

        let init_size = dst.len();
        dst.resize(init_size + bytes, 0);
        dst.push(self.num_hashes as u8);
        let array = &mut dst[init_size..init_size + bytes];

        for key in keys {
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.num_hashes {
                let bit = (h as usize) % bits;
                array[bit / 8] |= 1 << (bit % 8);
                h = h.wrapping_add(delta);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }
        let (array, k) = filter.split_at(filter.len() - 1);
        let k = k[0] as usize;
        if k > 30 {
            // Reserved for other encodings; treat as a match
            return true;
        }
        let bits = array.len() * 8;

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bit = (h as usize) % bits;
            if array[bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

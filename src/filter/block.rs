//! Filter Block
//!
//! One filter segment per `2^base_lg` bytes of data-file offset space, so a
//! reader can find the filter for any data block by shifting its offset.
//!
//! ## Block layout
//! ```text
//! ┌─────────────┬─────────────┬─────┬──────────────┬──────────────┬───────────┬─────────┐
//! │ segment 0   │ segment 1   │ ... │ offset[0..n] │ n (fixed32)  │ array_pos │ base_lg │
//! │             │             │     │ (fixed32 ea) │              │ (fixed32) │  (u8)   │
//! └─────────────┴─────────────┴─────┴──────────────┴──────────────┴───────────┴─────────┘
//! ```
//! Segment `i` spans `offset[i]..offset[i + 1]` (the last one ends at
//! `array_pos`). An empty segment is a bucket with no keys.
//!
//! A segment is a sequence of `varint32 len ++ filter` chunks. A bucket
//! normally holds one chunk; when staged keys would exceed the staging
//! capacity, the builder closes a chunk early and keeps filling the same
//! bucket. A key may match a segment if it may match any of its chunks.

use std::sync::Arc;

use crate::coding::{decode_fixed32, get_length_prefixed_slice, put_fixed32, put_varint32};

use super::FilterPolicy;

/// Default bucket granularity: one filter per 2 KiB of data offsets
pub const FILTER_BASE_LG: u8 = 11;

/// Default cap on staged key bytes before a chunk is closed
pub const STAGING_CAPACITY: usize = 1 << 20;

// n (fixed32) + array_pos (fixed32) + base_lg (u8)
const TRAILER_SIZE: usize = 9;

// =============================================================================
// Builder
// =============================================================================

/// Accumulates keys per data block and emits the filter block at table finish
///
/// Call order: `(start_block add_key*)* finish`
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    base_lg: u8,
    staging_capacity: usize,

    // Flattened key contents for the current chunk
    keys: Vec<u8>,
    starts: Vec<usize>,

    // Chunks already closed for the open bucket
    pending: Vec<u8>,

    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self::with_base_lg(policy, FILTER_BASE_LG)
    }

    pub fn with_base_lg(policy: Arc<dyn FilterPolicy>, base_lg: u8) -> Self {
        Self {
            policy,
            base_lg: base_lg.min(63),
            staging_capacity: STAGING_CAPACITY,
            keys: Vec::new(),
            starts: Vec::new(),
            pending: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    pub fn with_staging_capacity(mut self, bytes: usize) -> Self {
        self.staging_capacity = bytes.max(1);
        self
    }

    /// A data block begins at `block_offset`; finalize every bucket before it
    pub fn start_block(&mut self, block_offset: u64) {
        let index = (block_offset >> self.base_lg) as usize;
        debug_assert!(index >= self.filter_offsets.len(), "block offsets must not go backwards");
        while index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    /// Stage a key for the open bucket
    pub fn add_key(&mut self, key: &[u8]) {
        if !self.starts.is_empty() && self.keys.len() + key.len() > self.staging_capacity {
            self.close_chunk();
        }
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Number of buckets finalized so far
    pub fn num_buckets(&self) -> usize {
        self.filter_offsets.len()
    }

    /// Finalize any open bucket and append the trailer
    pub fn finish(mut self) -> Vec<u8> {
        if !self.starts.is_empty() || !self.pending.is_empty() {
            self.generate_filter();
        }

        let array_pos = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, self.filter_offsets.len() as u32);
        put_fixed32(&mut self.result, array_pos);
        self.result.push(self.base_lg);
        self.result
    }

    fn close_chunk(&mut self) {
        if self.starts.is_empty() {
            return;
        }

        let mut slices: Vec<&[u8]> = Vec::with_capacity(self.starts.len());
        for (i, &start) in self.starts.iter().enumerate() {
            let end = self.starts.get(i + 1).copied().unwrap_or(self.keys.len());
            slices.push(&self.keys[start..end]);
        }

        let mut filter = Vec::new();
        self.policy.create_filter(&slices, &mut filter);
        put_varint32(&mut self.pending, filter.len() as u32);
        self.pending.extend_from_slice(&filter);

        self.keys.clear();
        self.starts.clear();
    }

    fn generate_filter(&mut self) {
        self.close_chunk();
        self.filter_offsets.push(self.result.len() as u32);
        self.result.append(&mut self.pending);
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Answers membership queries against a finished filter block
///
/// A malformed trailer disables the filter: every query reports "may match".
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    // Segment boundaries; the final entry is array_pos
    offsets: Vec<usize>,
    base_lg: u8,
    valid: bool,
}

impl FilterBlockReader {
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Vec<u8>) -> Self {
        let mut reader = Self {
            policy,
            data: contents,
            offsets: Vec::new(),
            base_lg: 0,
            valid: false,
        };
        match parse_trailer(&reader.data) {
            Some((offsets, base_lg)) => {
                reader.offsets = offsets;
                reader.base_lg = base_lg;
                reader.valid = true;
            }
            None => {
                tracing::warn!(len = reader.data.len(), "malformed filter block trailer, ignoring filter");
            }
        }
        reader
    }

    /// Whether the trailer parsed; an invalid reader matches everything
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn num_segments(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Bytes held by this reader
    pub fn size(&self) -> usize {
        self.data.len() + self.offsets.len() * std::mem::size_of::<usize>()
    }

    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        if !self.valid {
            return true;
        }
        let index = block_offset >> self.base_lg;
        if index >= self.num_segments() as u64 {
            return true;
        }
        let index = index as usize;
        let start = self.offsets[index];
        let limit = self.offsets[index + 1];
        if start == limit {
            // Empty bucket: no keys were added for this range
            return false;
        }
        self.segment_may_match(&self.data[start..limit], key)
    }

    fn segment_may_match(&self, mut segment: &[u8], key: &[u8]) -> bool {
        while !segment.is_empty() {
            match get_length_prefixed_slice(&mut segment) {
                Some(filter) => {
                    if self.policy.key_may_match(key, filter) {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }
}

/// Segment boundaries (n + 1 entries) and base_lg, or None if malformed
fn parse_trailer(data: &[u8]) -> Option<(Vec<usize>, u8)> {
    let len = data.len();
    if len < TRAILER_SIZE {
        return None;
    }
    let base_lg = data[len - 1];
    if base_lg > 63 {
        return None;
    }
    let array_pos = decode_fixed32(&data[len - 5..]) as usize;
    let num = decode_fixed32(&data[len - 9..]) as usize;
    if array_pos.checked_add(num.checked_mul(4)?)? != len - TRAILER_SIZE {
        return None;
    }

    let mut offsets = Vec::with_capacity(num + 1);
    let mut prev = 0usize;
    for i in 0..num {
        let offset = decode_fixed32(&data[array_pos + 4 * i..]) as usize;
        if offset < prev || offset > array_pos {
            return None;
        }
        offsets.push(offset);
        prev = offset;
    }
    offsets.push(array_pos);
    Some((offsets, base_lg))
}

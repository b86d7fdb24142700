//! Tests for bloom filters and filter blocks
//!
//! These tests verify:
//! - Bloom filters never give false negatives
//! - False positive rate stays under 2% at 10 bits per key
//! - Filter sizes stay within bits-per-key bounds
//! - Filter blocks partition keys by data offset (2 KiB buckets)
//! - Empty buckets never match

use std::sync::Arc;

use smrkv::filter::{BloomFilterPolicy, FilterBlockBuilder, FilterBlockReader, FilterPolicy};

// =============================================================================
// Helper Functions
// =============================================================================

fn key(i: u32) -> [u8; 4] {
    i.to_le_bytes()
}

/// 1, 2, ..., 10, 20, ..., 100, 200, ... up to 10000
fn next_length(length: usize) -> usize {
    if length < 10 {
        length + 1
    } else if length < 100 {
        length + 10
    } else if length < 1000 {
        length + 100
    } else {
        length + 1000
    }
}

fn build_filter(policy: &BloomFilterPolicy, count: u32) -> Vec<u8> {
    let keys: Vec<[u8; 4]> = (0..count).map(key).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| &k[..]).collect();
    let mut filter = Vec::new();
    policy.create_filter(&refs, &mut filter);
    filter
}

fn false_positive_rate(policy: &BloomFilterPolicy, filter: &[u8]) -> f64 {
    let hits = (0..10_000u32)
        .filter(|i| policy.key_may_match(&key(i + 1_000_000_000), filter))
        .count();
    hits as f64 / 10_000.0
}

// =============================================================================
// Bloom Filter Tests
// =============================================================================

#[test]
fn test_varying_lengths() {
    let policy = BloomFilterPolicy::new(10);
    let mut mediocre = 0;
    let mut good = 0;

    let mut length = 1;
    while length <= 10_000 {
        let filter = build_filter(&policy, length as u32);
        assert!(
            filter.len() <= length * 10 / 8 + 40,
            "filter for {} keys is {} bytes",
            length,
            filter.len()
        );

        for i in 0..length as u32 {
            assert!(policy.key_may_match(&key(i), &filter), "length {} key {}", length, i);
        }

        let rate = false_positive_rate(&policy, &filter);
        assert!(rate <= 0.02, "length {} false positive rate {}", length, rate);
        if rate > 0.0125 {
            mediocre += 1;
        } else {
            good += 1;
        }
        length = next_length(length);
    }
    assert!(mediocre <= good / 5, "{} mediocre vs {} good filters", mediocre, good);
}

// =============================================================================
// Filter Block Tests
// =============================================================================

#[test]
fn test_filter_block_sequential_keys() {
    let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));
    let mut builder = FilterBlockBuilder::new(policy.clone());
    builder.start_block(0);
    for i in 0..10_000u32 {
        builder.add_key(&key(i));
    }
    let block = builder.finish();
    assert!(block.len() <= 10_000 * 10 / 8 + 40, "block is {} bytes", block.len());

    let reader = FilterBlockReader::new(policy, block);
    for i in 0..10_000u32 {
        assert!(reader.key_may_match(0, &key(i)));
    }
    let hits = (0..10_000u32)
        .filter(|i| reader.key_may_match(0, &key(i + 1_000_000_000)))
        .count();
    assert!(hits <= 200, "{} false positives", hits);
}

#[test]
fn test_filter_block_buckets_by_offset() {
    let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));
    let mut builder = FilterBlockBuilder::new(policy.clone());

    // Ten data blocks of ~3 KiB each, 100 keys per block
    let mut offsets = Vec::new();
    for block in 0..10u32 {
        let offset = u64::from(block) * 3000;
        offsets.push(offset);
        builder.start_block(offset);
        for i in 0..100 {
            builder.add_key(&key(block * 100 + i));
        }
    }
    let reader = FilterBlockReader::new(policy, builder.finish());

    for (block, &offset) in offsets.iter().enumerate() {
        for i in 0..100 {
            assert!(reader.key_may_match(offset, &key(block as u32 * 100 + i)));
        }
    }

    // Buckets in which no block starts hold no keys
    let empty_bucket = (0..reader.num_segments() as u64)
        .find(|&b| (0..10u64).all(|blk| (blk * 3000) >> 11 != b))
        .expect("some bucket has no block start");
    for i in 0..1000u32 {
        assert!(!reader.key_may_match(empty_bucket << 11, &key(i)));
    }
}

#[test]
fn test_filter_block_capacity_pressure() {
    let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));
    let mut builder = FilterBlockBuilder::new(policy.clone()).with_staging_capacity(4 * 100);
    builder.start_block(0);
    for i in 0..1000u32 {
        builder.add_key(&key(i));
    }
    builder.start_block(4096);
    builder.add_key(&key(5000));
    let reader = FilterBlockReader::new(policy, builder.finish());

    assert_eq!(reader.num_segments(), 3);
    for i in 0..1000u32 {
        assert!(reader.key_may_match(0, &key(i)));
    }
    assert!(reader.key_may_match(4096, &key(5000)));
    for i in 0..1000u32 {
        assert!(!reader.key_may_match(2048, &key(i)));
    }
}

#[test]
fn test_corrupt_block_degrades_to_may_match() {
    let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));
    let mut builder = FilterBlockBuilder::new(policy.clone());
    builder.start_block(0);
    builder.add_key(b"present");
    let mut block = builder.finish();

    // Claim more segments than the block holds
    let len = block.len();
    block[len - 9] = 200;
    let reader = FilterBlockReader::new(policy, block);
    assert!(!reader.is_valid());
    assert!(reader.key_may_match(0, b"absent"));
}

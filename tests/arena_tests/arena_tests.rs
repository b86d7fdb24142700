//! Tests for the Arena allocator
//!
//! These tests verify:
//! - Allocations never overlap and keep their contents
//! - Large requests get a dedicated block
//! - Aligned allocations honor ALIGN
//! - Memory usage accounting

use smrkv::arena::{ALIGN, BLOCK_SIZE};
use smrkv::Arena;

// =============================================================================
// Helper Functions
// =============================================================================

/// Deterministic allocation sizes: mostly small, occasionally large
fn allocation_size(i: usize) -> usize {
    if i % 997 == 0 {
        6000
    } else if i % 101 == 0 {
        1500
    } else if i % 7 == 0 {
        1 + (i * 31) % 300
    } else {
        1 + (i * 17) % 20
    }
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_contents_survive_later_allocations() {
    let arena = Arena::new();
    let mut allocated: Vec<(usize, *const u8)> = Vec::new();
    let mut bytes = 0;

    for i in 0..10_000 {
        let size = allocation_size(i);
        let buf = if i % 10 == 0 {
            arena.allocate_aligned(size)
        } else {
            arena.allocate(size)
        };
        for (b, byte) in buf.iter_mut().enumerate() {
            *byte = (i % 256) as u8 ^ (b % 7) as u8;
        }
        bytes += size;
        allocated.push((size, buf.as_ptr()));
        assert!(arena.memory_usage() >= bytes);
    }

    for (i, &(size, ptr)) in allocated.iter().enumerate() {
        // Arena memory lives until the arena drops
        let buf = unsafe { std::slice::from_raw_parts(ptr, size) };
        for (b, byte) in buf.iter().enumerate() {
            assert_eq!(*byte, (i % 256) as u8 ^ (b % 7) as u8, "allocation {} byte {}", i, b);
        }
    }
}

#[test]
fn test_allocations_do_not_overlap() {
    let arena = Arena::new();
    let mut ranges: Vec<(usize, usize)> = (0..2000)
        .map(|i| {
            let size = allocation_size(i);
            let start = arena.allocate(size).as_ptr() as usize;
            (start, start + size)
        })
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
}

#[test]
fn test_large_request_gets_dedicated_block() {
    let arena = Arena::new();
    let small = arena.allocate(16).as_ptr() as usize;
    assert_eq!(arena.block_count(), 1);

    arena.allocate(BLOCK_SIZE / 4 + 1);
    assert_eq!(arena.block_count(), 2);

    // The shared block keeps serving small requests
    let next = arena.allocate(16).as_ptr() as usize;
    assert_eq!(next, small + 16);
    assert_eq!(arena.block_count(), 2);
}

#[test]
fn test_quarter_block_request_uses_shared_block() {
    let arena = Arena::new();
    arena.allocate(BLOCK_SIZE / 4);
    arena.allocate(BLOCK_SIZE / 4);
    assert_eq!(arena.block_count(), 1);
}

#[test]
fn test_aligned_allocations() {
    let arena = Arena::new();
    for size in [1, 3, 7, 8, 13, 100, 2000] {
        arena.allocate(size % 5 + 1);
        let ptr = arena.allocate_aligned(size).as_ptr() as usize;
        assert_eq!(ptr % ALIGN, 0, "size {}", size);
    }
}

#[test]
fn test_memory_usage_counts_blocks() {
    let arena = Arena::new();
    assert_eq!(arena.memory_usage(), 0);
    arena.allocate(1);
    assert!(arena.memory_usage() >= BLOCK_SIZE);
    let before = arena.memory_usage();
    arena.allocate(10_000);
    assert!(arena.memory_usage() >= before + 10_000);
}

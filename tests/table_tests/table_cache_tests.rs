//! Tests for the TableCache
//!
//! These tests verify:
//! - Tables are opened once and shared across lookups
//! - Legacy file names are used when the current name is missing
//! - Open failures are not cached
//! - Eviction does not close tables still referenced by iterators
//! - LRU eviction charged by metadata size
//! - Concurrent readers of the same table

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::sync::Arc;

use common::{user_key, user_value, write_table, TestEnv};
use smrkv::env::{legacy_table_file_name, table_file_name, PosixEnv};
use smrkv::key::{LookupKey, MAX_SEQUENCE_NUMBER};
use smrkv::table::FileMetaData;
use smrkv::{Options, ReadOptions, TableCache};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, Options) {
    common::init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let options = Options::builder()
        .db_path(temp_dir.path())
        .block_size(512)
        .build();
    (temp_dir, options)
}

fn lookup(cache: &TableCache, meta: &FileMetaData, i: usize) -> Option<Vec<u8>> {
    cache
        .get(
            &ReadOptions::default(),
            meta.number,
            meta.file_size,
            meta.level,
            &LookupKey::new(&user_key(i), MAX_SEQUENCE_NUMBER),
        )
        .unwrap()
        .map(|entry| entry.value)
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_find_table_opens_once() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 5, 0, 100);
    let cache = TableCache::new(env.clone(), options.clone());

    let first = cache.find_table(meta.number, meta.file_size, meta.level).unwrap();
    let second = cache.find_table(meta.number, meta.file_size, meta.level).unwrap();

    assert!(first.same_table(&second));
    assert_eq!(first.file_number(), 5);
    assert_eq!(env.open_count(&table_file_name(&options.db_path, 5, 0)), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.total_charge(), first.metadata_size());
}

#[test]
fn test_get_through_cache() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 1, 2, 200);
    let cache = TableCache::new(env.clone(), options);

    for i in (0..200).step_by(7) {
        assert_eq!(lookup(&cache, &meta, i), Some(user_value(i)));
    }
    assert_eq!(lookup(&cache, &meta, 500), None);
    assert_eq!(env.total_opens(), 1);
}

#[test]
fn test_legacy_name_fallback() {
    let (_temp, options) = setup_temp_db();
    let meta = write_table(&PosixEnv::new(), &options, 9, 0, 50);
    let legacy = legacy_table_file_name(&options.db_path, 9);
    fs::rename(table_file_name(&options.db_path, 9, 0), &legacy).unwrap();

    let env = TestEnv::new();
    let cache = TableCache::new(env.clone(), options);
    assert_eq!(lookup(&cache, &meta, 10), Some(user_value(10)));
    assert_eq!(env.open_count(&legacy), 1);
}

#[test]
fn test_missing_table_is_io_error() {
    let (_temp, options) = setup_temp_db();
    let cache = TableCache::new(TestEnv::new(), options);
    let err = cache.find_table(77, 1000, 0).unwrap_err();
    assert!(err.is_io_error());
    assert!(cache.is_empty());
}

// =============================================================================
// Failure Handling Tests
// =============================================================================

#[test]
fn test_open_failure_is_not_cached() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 3, 0, 20);
    let cache = TableCache::new(env.clone(), options);

    env.set_fail_opens(true);
    assert!(cache.find_table(meta.number, meta.file_size, meta.level).is_err());
    assert!(cache.is_empty());

    // The very next access after repair succeeds
    env.set_fail_opens(false);
    assert_eq!(lookup(&cache, &meta, 3), Some(user_value(3)));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_corrupt_table_is_not_cached() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 4, 0, 20);
    let path = table_file_name(&options.db_path, 4, 0);
    let good = fs::read(&path).unwrap();

    let mut bad = good.clone();
    let last = bad.len() - 1;
    bad[last] ^= 0xff;
    fs::write(&path, &bad).unwrap();

    let cache = TableCache::new(env.clone(), options);
    let err = cache.find_table(meta.number, meta.file_size, meta.level).unwrap_err();
    assert!(err.is_corruption());
    assert!(cache.is_empty());

    fs::write(&path, &good).unwrap();
    assert!(cache.find_table(meta.number, meta.file_size, meta.level).is_ok());
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_evict_keeps_iterator_alive() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 6, 0, 100);
    let cache = TableCache::new(env.clone(), options);

    let mut iter = cache
        .new_iterator(&ReadOptions::default(), meta.number, meta.file_size, meta.level)
        .unwrap();
    assert_eq!(iter.table().file_number(), 6);
    let first = iter.next().unwrap().unwrap();

    cache.evict(meta.number);
    assert!(cache.is_empty());
    assert_eq!(env.live_files(), 1);

    // Still readable after eviction
    let rest: Vec<_> = iter.by_ref().collect::<smrkv::Result<_>>().unwrap();
    assert_eq!(rest.len() + 1, 100);
    assert_eq!(first.1, user_value(0));

    drop(iter);
    assert_eq!(env.live_files(), 0);

    // Next access reopens
    assert_eq!(lookup(&cache, &meta, 1), Some(user_value(1)));
    assert_eq!(env.total_opens(), 2);
}

#[test]
fn test_lru_eviction_by_metadata_charge() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let metas: Vec<FileMetaData> = (1..=4)
        .map(|n| write_table(env.as_ref(), &options, n, 0, 200))
        .collect();

    // Learn one table's charge, then size the cache for two of them
    let sizing = TableCache::new(env.clone(), options.clone());
    let charge = sizing
        .find_table(metas[0].number, metas[0].file_size, 0)
        .unwrap()
        .metadata_size();
    let options = Options {
        table_cache_capacity: charge * 2,
        ..options
    };
    let cache = TableCache::new(env.clone(), options.clone());

    for meta in &metas {
        assert_eq!(lookup(&cache, meta, 0), Some(user_value(0)));
    }
    assert_eq!(cache.len(), 2);
    assert!(cache.total_charge() <= charge * 2);

    // Tables 3 and 4 are cached; table 1 must be reopened
    let before = env.open_count(&table_file_name(&options.db_path, 1, 0));
    lookup(&cache, &metas[3], 5);
    lookup(&cache, &metas[0], 5);
    assert_eq!(env.open_count(&table_file_name(&options.db_path, 1, 0)), before + 1);
    assert_eq!(env.open_count(&table_file_name(&options.db_path, 4, 0)), 1);
}

#[test]
fn test_evicted_handle_outlives_cache_entry() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let meta = write_table(env.as_ref(), &options, 8, 0, 50);
    let cache = TableCache::new(env.clone(), options);

    let handle = cache.find_table(meta.number, meta.file_size, meta.level).unwrap();
    cache.evict(meta.number);
    assert_eq!(env.live_files(), 1);

    let entry = handle
        .internal_get(&ReadOptions::default(), &LookupKey::new(&user_key(7), MAX_SEQUENCE_NUMBER))
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, user_value(7));

    drop(handle);
    assert_eq!(env.live_files(), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers() {
    let (_temp, options) = setup_temp_db();
    let env = TestEnv::new();
    let metas: Vec<FileMetaData> = (1..=3)
        .map(|n| write_table(env.as_ref(), &options, n, 0, 300))
        .collect();
    let cache = Arc::new(TableCache::new(env.clone(), options));

    crossbeam::scope(|s| {
        for t in 0..8 {
            let cache = &cache;
            let metas = &metas;
            s.spawn(move |_| {
                for round in 0..200 {
                    let meta = &metas[(t + round) % metas.len()];
                    let i = (t * 37 + round * 11) % 300;
                    assert_eq!(lookup(cache, meta, i), Some(user_value(i)));
                    if round % 50 == 49 {
                        cache.evict(meta.number);
                    }
                }
            });
        }
    })
    .unwrap();

    assert!(cache.len() <= 3);
}

//! Tests for durability log writing and recovery
//!
//! These tests verify:
//! - Recovery from a clean log
//! - Recovery from an empty log
//! - Recovery with a torn final record (truncated tail)
//! - Recovery with a corrupted record (CRC mismatch)
//! - A record holding a malformed batch aborts recovery
//! - Large values are staged in the pool during replay

#[path = "../common/mod.rs"]
mod common;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use smrkv::env::{log_file_name, Env, PosixEnv};
use smrkv::key::{LookupKey, MAX_SEQUENCE_NUMBER};
use smrkv::mem::{BufferPool, HeapBufferPool};
use smrkv::value::ValueKind;
use smrkv::wal::{recover_log, LogReader, LogWriter, RecoveryResult};
use smrkv::{MemTable, WriteBatch};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    common::init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let log_path = log_file_name(temp_dir.path(), 1);
    (temp_dir, log_path)
}

/// Batch `b` holds `per_batch` puts starting at sequence `1 + b * per_batch`
fn write_batches(path: &PathBuf, batches: usize, per_batch: usize) {
    let mut writer = LogWriter::new(PosixEnv::new().new_writable_file(path).unwrap());
    for b in 0..batches {
        let mut batch = WriteBatch::new();
        batch.set_sequence((1 + b * per_batch) as u64);
        for i in 0..per_batch {
            let n = b * per_batch + i;
            batch
                .put(format!("key{}", n).as_bytes(), ValueKind::Internal, b"", format!("value{}", n).as_bytes())
                .unwrap();
        }
        writer.add_batch(&batch).unwrap();
    }
    writer.sync().unwrap();
    assert_eq!(writer.records_written(), batches as u64);
}

fn recover(path: &PathBuf, mem: &mut MemTable) -> smrkv::Result<RecoveryResult> {
    let pool: Arc<dyn BufferPool> = Arc::new(HeapBufferPool::unbounded());
    recover_log(&PosixEnv::new(), path, mem, pool, 8192)
}

fn get(mem: &MemTable, key: &str) -> Option<Vec<u8>> {
    mem.get(&LookupKey::new(key.as_bytes(), MAX_SEQUENCE_NUMBER))
        .and_then(|found| found.value().map(|v| v.data().to_vec()))
}

// =============================================================================
// Recover: Clean Log Tests
// =============================================================================

#[test]
fn test_recover_clean_log() {
    let (_temp, path) = setup_temp_log();
    write_batches(&path, 5, 4);

    let mut mem = MemTable::new();
    let result = recover(&path, &mut mem).unwrap();

    assert_eq!(
        result,
        RecoveryResult {
            batches: 5,
            records: 20,
            last_sequence: 20,
        }
    );
    assert_eq!(mem.len(), 20);
    assert_eq!(get(&mem, "key0"), Some(b"value0".to_vec()));
    assert_eq!(get(&mem, "key19"), Some(b"value19".to_vec()));
}

#[test]
fn test_recover_empty_log() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, b"").unwrap();

    let mut mem = MemTable::new();
    assert_eq!(recover(&path, &mut mem).unwrap(), RecoveryResult::default());
    assert!(mem.is_empty());
}

#[test]
fn test_recover_missing_log_is_io_error() {
    let (_temp, path) = setup_temp_log();
    let mut mem = MemTable::new();
    assert!(recover(&path, &mut mem).unwrap_err().is_io_error());
}

#[test]
fn test_deletes_replayed_with_sequences() {
    let (_temp, path) = setup_temp_log();
    let mut writer = LogWriter::new(PosixEnv::new().new_writable_file(&path).unwrap());

    let mut first = WriteBatch::new();
    first.set_sequence(1);
    first.put(b"k", ValueKind::Internal, b"", b"v1").unwrap();
    writer.add_batch(&first).unwrap();

    let mut second = WriteBatch::new();
    second.set_sequence(2);
    second.delete(b"k");
    writer.add_batch(&second).unwrap();
    writer.sync().unwrap();

    let mut mem = MemTable::new();
    let result = recover(&path, &mut mem).unwrap();
    assert_eq!(result.last_sequence, 2);
    assert_eq!(get(&mem, "k"), None);
    assert!(mem.get(&LookupKey::new(b"k", 1)).unwrap().value().is_some());
}

// =============================================================================
// Recover: Damaged Log Tests
// =============================================================================

#[test]
fn test_recover_truncated_tail() {
    let (_temp, path) = setup_temp_log();
    write_batches(&path, 3, 2);

    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();

    let mut mem = MemTable::new();
    let result = recover(&path, &mut mem).unwrap();
    assert_eq!(result.batches, 2);
    assert_eq!(result.records, 4);
    assert_eq!(result.last_sequence, 4);
    assert_eq!(get(&mem, "key5"), None);
}

#[test]
fn test_recover_partial_header() {
    let (_temp, path) = setup_temp_log();
    write_batches(&path, 1, 1);
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0xab, 0xcd, 0xef]);
    fs::write(&path, &bytes).unwrap();

    let mut mem = MemTable::new();
    assert_eq!(recover(&path, &mut mem).unwrap().batches, 1);
}

#[test]
fn test_recover_crc_mismatch() {
    let (_temp, path) = setup_temp_log();
    write_batches(&path, 3, 2);

    // Flip the final byte of the second record's payload
    let mut bytes = fs::read(&path).unwrap();
    let record_len = bytes.len() / 3;
    bytes[2 * record_len - 1] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut mem = MemTable::new();
    let err = recover(&path, &mut mem).unwrap_err();
    assert!(err.is_corruption());
    // First batch applied, the damaged one not at all
    assert_eq!(mem.len(), 2);
    assert_eq!(get(&mem, "key2"), None);
}

#[test]
fn test_recover_malformed_batch() {
    let (_temp, path) = setup_temp_log();
    let mut batch = WriteBatch::new();
    batch.put(b"k", ValueKind::Internal, b"", b"v").unwrap();
    let mut contents = batch.contents().to_vec();
    // Header claims two records
    contents[8..12].copy_from_slice(&2u32.to_le_bytes());

    let mut writer = LogWriter::new(PosixEnv::new().new_writable_file(&path).unwrap());
    writer.add_record(&contents).unwrap();
    writer.sync().unwrap();

    let mut mem = MemTable::new();
    let err = recover(&path, &mut mem).unwrap_err();
    assert!(err.is_corruption());
    assert!(mem.is_empty());
}

#[test]
fn test_recover_sequence_out_of_range() {
    let (_temp, path) = setup_temp_log();
    let mut writer = LogWriter::new(PosixEnv::new().new_writable_file(&path).unwrap());

    let mut good = WriteBatch::new();
    good.set_sequence(1);
    good.delete(b"a");
    writer.add_batch(&good).unwrap();

    let mut bad = WriteBatch::new();
    bad.delete(b"b");
    bad.delete(b"c");
    let mut contents = bad.contents().to_vec();
    contents[0..8].copy_from_slice(&u64::MAX.to_le_bytes());
    writer.add_record(&contents).unwrap();
    writer.sync().unwrap();

    let mut mem = MemTable::new();
    let err = recover(&path, &mut mem).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(mem.len(), 1);
}

// =============================================================================
// Reader / Staging Tests
// =============================================================================

#[test]
fn test_reader_returns_records_in_order() {
    let (_temp, path) = setup_temp_log();
    let env = PosixEnv::new();
    {
        let mut writer = LogWriter::new(env.new_writable_file(&path).unwrap());
        writer.add_record(b"one").unwrap();
        writer.add_record(b"").unwrap();
        writer.sync().unwrap();
    }
    {
        let mut writer = LogWriter::new(env.new_appendable_file(&path).unwrap());
        writer.add_record(b"three").unwrap();
        writer.sync().unwrap();
    }

    let reader = LogReader::new(env.new_random_access_file(&path).unwrap()).unwrap();
    let records: Vec<Vec<u8>> = reader.collect::<smrkv::Result<_>>().unwrap();
    assert_eq!(records, vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]);
}

#[test]
fn test_large_values_staged_during_recovery() {
    let (_temp, path) = setup_temp_log();
    let mut writer = LogWriter::new(PosixEnv::new().new_writable_file(&path).unwrap());
    let mut batch = WriteBatch::new();
    batch.set_sequence(1);
    batch.put(b"big", ValueKind::Internal, b"", &[5u8; 4000]).unwrap();
    batch.put(b"small", ValueKind::Internal, b"", b"x").unwrap();
    writer.add_batch(&batch).unwrap();
    writer.sync().unwrap();

    let heap = Arc::new(HeapBufferPool::new(1 << 20));
    let pool: Arc<dyn BufferPool> = heap.clone();
    let mut mem = MemTable::new();
    recover_log(&PosixEnv::new(), &path, &mut mem, pool, 1024).unwrap();

    assert_eq!(heap.usage(), 4000);
    let found = mem.get(&LookupKey::new(b"big", MAX_SEQUENCE_NUMBER)).unwrap();
    assert!(found.value().unwrap().is_pooled());

    drop(mem);
    assert_eq!(heap.usage(), 0);
}

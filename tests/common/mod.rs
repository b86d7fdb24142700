//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use smrkv::env::{Env, PosixEnv, RandomAccessFile, WritableFile};
use smrkv::key::{InternalKey, ValueType};
use smrkv::table::{build_table, FileMetaData};
use smrkv::{Options, Result, Status};

/// Route engine tracing to the test harness (RUST_LOG to enable)
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Instrumented environment
// =============================================================================

/// PosixEnv wrapper that counts opens, tracks live read handles, and can be
/// told to fail opens
#[derive(Default)]
pub struct TestEnv {
    inner: PosixEnv,
    opens: Mutex<HashMap<PathBuf, usize>>,
    fail_opens: AtomicBool,
    live_files: Arc<AtomicUsize>,
}

impl TestEnv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Successful random-access opens of `path`
    pub fn open_count(&self, path: &Path) -> usize {
        self.opens.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.opens.lock().values().sum()
    }

    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Random-access files opened and not yet dropped
    pub fn live_files(&self) -> usize {
        self.live_files.load(Ordering::SeqCst)
    }
}

struct TrackedFile {
    inner: Box<dyn RandomAccessFile>,
    live: Arc<AtomicUsize>,
}

impl RandomAccessFile for TrackedFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn size(&self) -> Result<u64> {
        self.inner.size()
    }
}

impl Drop for TrackedFile {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Env for TestEnv {
    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(Status::io_error(format!("{}: injected failure", path.display())));
        }
        let inner = self.inner.new_random_access_file(path)?;
        *self.opens.lock().entry(path.to_path_buf()).or_default() += 1;
        self.live_files.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedFile {
            inner,
            live: Arc::clone(&self.live_files),
        }))
    }

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        self.inner.new_writable_file(path)
    }

    fn new_appendable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        self.inner.new_appendable_file(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.inner.file_exists(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to)
    }
}

// =============================================================================
// Table helpers
// =============================================================================

pub fn user_key(i: usize) -> Vec<u8> {
    format!("key{:06}", i).into_bytes()
}

pub fn user_value(i: usize) -> Vec<u8> {
    format!("value{}", i).into_bytes()
}

/// Build table `number` holding `key{i}` -> `value{i}` at sequence i + 1
pub fn write_table(env: &dyn Env, options: &Options, number: u64, level: u32, count: usize) -> FileMetaData {
    let entries = (0..count).map(|i| {
        let key = InternalKey::new(&user_key(i), i as u64 + 1, ValueType::Value);
        (key.encoded().to_vec(), user_value(i))
    });
    build_table(env, options, number, level, entries).unwrap()
}

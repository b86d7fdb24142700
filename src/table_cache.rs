//! Table Cache
//!
//! Keeps recently used tables open, keyed by file number.
//!
//! ## Responsibilities
//! - Open a table on first use (current layout, then the legacy name)
//! - Charge each open table by its in-memory metadata footprint
//! - Hand out handles that keep a table open past eviction
//! - Never cache open failures, so a repaired file is retried on next use
//!
//! ## Concurrency:
//! - `cache`: Protected by a Mutex held only for map operations
//! - File opens and table parsing happen outside the lock
//! - All methods use `&self`

use std::borrow::Borrow;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::LruCache;
use crate::config::{Options, ReadOptions};
use crate::env::{legacy_table_file_name, table_file_name, Env};
use crate::error::Result;
use crate::key::LookupKey;
use crate::table::{Table, TableEntry, TableIter};

struct CachedTable {
    file_number: u64,
    table: Table,
}

/// A reference to an open table; the table stays open while any handle lives
#[derive(Clone)]
pub struct TableHandle(Arc<CachedTable>);

impl TableHandle {
    pub fn file_number(&self) -> u64 {
        self.0.file_number
    }

    pub fn table(&self) -> &Table {
        &self.0.table
    }

    /// Whether two handles refer to the same open table
    pub fn same_table(&self, other: &TableHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for TableHandle {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.0.table
    }
}

impl Borrow<Table> for TableHandle {
    fn borrow(&self) -> &Table {
        &self.0.table
    }
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandle")
            .field("file_number", &self.0.file_number)
            .field("table", &self.0.table)
            .finish()
    }
}

/// Iterator over a cached table; dropping it releases the cache reference
pub type TableIterator = TableIter<TableHandle>;

/// Cache of open tables
pub struct TableCache {
    env: Arc<dyn Env>,
    options: Options,
    cache: Mutex<LruCache<u64, CachedTable>>,
}

impl TableCache {
    pub fn new(env: Arc<dyn Env>, options: Options) -> Self {
        let capacity = options.table_cache_capacity;
        Self {
            env,
            options,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the open table for `file_number`, opening it on a miss
    pub fn find_table(&self, file_number: u64, file_size: u64, level: u32) -> Result<TableHandle> {
        if let Some(cached) = self.cache.lock().lookup(&file_number) {
            return Ok(TableHandle(cached));
        }

        let table = match self.open_table(file_number, file_size, level) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(file_number, level, error = %e, "failed to open table");
                return Err(e);
            }
        };
        let charge = table.metadata_size();

        let evicted;
        let handle = {
            let mut cache = self.cache.lock();
            // Another reader may have opened it while we were parsing
            if let Some(cached) = cache.lookup(&file_number) {
                return Ok(TableHandle(cached));
            }
            let (cached, displaced) = cache.insert(file_number, CachedTable { file_number, table }, charge);
            evicted = displaced;
            TableHandle(cached)
        };
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted tables from cache");
        }
        drop(evicted);

        tracing::debug!(file_number, level, charge, "opened table");
        Ok(handle)
    }

    /// Iterate a table; the table stays open until the iterator is dropped
    pub fn new_iterator(
        &self,
        read: &ReadOptions,
        file_number: u64,
        file_size: u64,
        level: u32,
    ) -> Result<TableIterator> {
        let handle = self.find_table(file_number, file_size, level)?;
        Ok(TableIter::new(handle, *read))
    }

    /// Point lookup in one table
    pub fn get(
        &self,
        read: &ReadOptions,
        file_number: u64,
        file_size: u64,
        level: u32,
        key: &LookupKey,
    ) -> Result<Option<TableEntry>> {
        let handle = self.find_table(file_number, file_size, level)?;
        handle.table().internal_get(read, key)
    }

    /// Drop the cache entry for a deleted file; open handles are unaffected
    pub fn evict(&self, file_number: u64) {
        let evicted = self.cache.lock().erase(&file_number);
        if evicted.is_some() {
            tracing::debug!(file_number, "evicted table");
        }
    }

    /// Number of tables currently cached
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Sum of cached tables' metadata charges
    pub fn total_charge(&self) -> usize {
        self.cache.lock().total_charge()
    }

    fn open_table(&self, file_number: u64, file_size: u64, level: u32) -> Result<Table> {
        let path = table_file_name(&self.options.db_path, file_number, level);
        let file = match self.env.new_random_access_file(&path) {
            Ok(file) => file,
            Err(primary) => {
                let legacy = legacy_table_file_name(&self.options.db_path, file_number);
                match self.env.new_random_access_file(&legacy) {
                    Ok(file) => {
                        tracing::debug!(file_number, path = %legacy.display(), "opened table under legacy name");
                        file
                    }
                    Err(_) => return Err(primary),
                }
            }
        };
        Table::open(&self.options, file, file_size)
    }
}

//! Table Iterator
//!
//! Sequential iteration over all entries in a table, one data block at a time.

use std::borrow::Borrow;

use crate::config::ReadOptions;
use crate::error::Result;

use super::reader::Table;

/// Iterator over table entries in internal-key order
///
/// Generic over how the table is held: `&Table` for borrowed iteration, or a
/// cache handle that keeps the table open until the iterator is dropped.
pub struct TableIter<T: Borrow<Table>> {
    table: T,
    read: ReadOptions,
    next_block: usize,
    current: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    failed: bool,
}

impl<T: Borrow<Table>> TableIter<T> {
    pub(crate) fn new(table: T, read: ReadOptions) -> Self {
        Self {
            table,
            read,
            next_block: 0,
            current: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// The table being iterated
    pub fn table(&self) -> &T {
        &self.table
    }
}

impl<T: Borrow<Table>> Iterator for TableIter<T> {
    /// (encoded internal key, value)
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }

            let table = self.table.borrow();
            if self.next_block >= table.num_blocks() {
                return None;
            }
            match table.block_entries(self.next_block, &self.read) {
                Ok(entries) => {
                    self.next_block += 1;
                    self.current = entries.into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

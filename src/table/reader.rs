//! Table Reader
//!
//! Opens table files and serves point lookups through the in-memory index
//! and filter block.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{Options, ReadOptions};
use crate::env::RandomAccessFile;
use crate::error::{Result, Status};
use crate::filter::{BloomFilterPolicy, FilterBlockReader};
use crate::key::{compare_internal_keys, parse_internal_key, LookupKey, ValueType};

use super::block::{parse_index, read_block, BlockRecords};
use super::iterator::TableIter;
use super::{BlockHandle, Footer, TableEntry, BLOCK_TRAILER_SIZE, FOOTER_SIZE};

// Probe count is stored in each filter, so any bits_per_key reads it back
const READ_BITS_PER_KEY: usize = 10;

/// An open table: the file plus its parsed index and filter
pub struct Table {
    file: Box<dyn RandomAccessFile>,
    /// One entry per data block: (last internal key, handle)
    index: Vec<(Vec<u8>, BlockHandle)>,
    filter: Option<FilterBlockReader>,
    metadata_size: usize,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("blocks", &self.index.len())
            .field("has_filter", &self.filter.is_some())
            .field("metadata_size", &self.metadata_size)
            .finish()
    }
}

impl Table {
    /// Open a table of `file_size` bytes
    ///
    /// Loads the index (and filter, when present) into memory.
    pub fn open(options: &Options, file: Box<dyn RandomAccessFile>, file_size: u64) -> Result<Self> {
        if file_size < FOOTER_SIZE {
            return Err(Status::corruption("file is too short to be a table"));
        }
        let footer = Footer::decode(&file.read_at(file_size - FOOTER_SIZE, FOOTER_SIZE as usize)?)?;
        let data_end = file_size - FOOTER_SIZE;

        if !fits(footer.index, BLOCK_TRAILER_SIZE, data_end) {
            return Err(Status::corruption("index block handle out of range"));
        }
        let index_block = read_block(file.as_ref(), footer.index, true)?;
        let index = parse_index(&index_block)?;
        // Data blocks all precede the filter and index blocks
        let data_limit = if footer.filter.size > 0 {
            footer.filter.offset.min(footer.index.offset)
        } else {
            footer.index.offset
        };
        if index.iter().any(|(_, handle)| !fits(*handle, BLOCK_TRAILER_SIZE, data_limit)) {
            return Err(Status::corruption("bad block handle in index"));
        }

        let filter = if footer.filter.size > 0 && fits(footer.filter, 0, data_end) {
            let contents = file.read_at(footer.filter.offset, footer.filter.size as usize)?;
            let bits = options.filter_bits_per_key.unwrap_or(READ_BITS_PER_KEY);
            let reader = FilterBlockReader::new(Arc::new(BloomFilterPolicy::new(bits)), contents);
            reader.is_valid().then_some(reader)
        } else {
            None
        };

        let metadata_size = index.iter().map(|(k, _)| k.len() + 16).sum::<usize>()
            + filter.as_ref().map_or(0, FilterBlockReader::size);

        Ok(Self {
            file,
            index,
            filter,
            metadata_size,
        })
    }

    /// Bytes of index and filter held in memory; the table cache charge
    pub fn metadata_size(&self) -> usize {
        self.metadata_size
    }

    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Newest entry for `key.user_key()` with sequence <= the lookup sequence
    pub fn internal_get(&self, read: &ReadOptions, key: &LookupKey) -> Result<Option<TableEntry>> {
        let target = key.internal_key();
        let block = self
            .index
            .partition_point(|(last, _)| compare_internal_keys(last, target) == Ordering::Less);
        let Some(&(_, handle)) = self.index.get(block) else {
            return Ok(None);
        };

        if read.use_bloom_filter {
            if let Some(filter) = &self.filter {
                if !filter.key_may_match(handle.offset, key.user_key()) {
                    return Ok(None);
                }
            }
        }

        let contents = read_block(self.file.as_ref(), handle, read.verify_checksums)?;
        for record in BlockRecords::new(&contents) {
            let (ikey, value) = record?;
            if compare_internal_keys(ikey, target) == Ordering::Less {
                continue;
            }
            let parsed = parse_internal_key(ikey)
                .ok_or_else(|| Status::corruption("bad internal key in table"))?;
            if parsed.user_key != key.user_key() {
                return Ok(None);
            }
            let value = match parsed.value_type {
                ValueType::Value => value.to_vec(),
                ValueType::Deletion => Vec::new(),
            };
            return Ok(Some(TableEntry {
                sequence: parsed.sequence,
                value_type: parsed.value_type,
                value,
            }));
        }
        Ok(None)
    }

    /// Iterate all entries in key order
    pub fn iter(&self, read: &ReadOptions) -> TableIter<&Table> {
        TableIter::new(self, *read)
    }

    /// Decoded records of data block `block`
    pub(super) fn block_entries(&self, block: usize, read: &ReadOptions) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let (_, handle) = self.index[block];
        let contents = read_block(self.file.as_ref(), handle, read.verify_checksums)?;
        BlockRecords::new(&contents)
            .map(|record| record.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect()
    }
}

fn fits(handle: BlockHandle, trailer: u64, limit: u64) -> bool {
    handle
        .offset
        .checked_add(handle.size)
        .and_then(|end| end.checked_add(trailer))
        .is_some_and(|end| end <= limit)
}

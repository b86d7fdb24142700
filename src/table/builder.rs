//! Table Builder
//!
//! Writes sorted internal-key entries to a new table file.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::Options;
use crate::env::WritableFile;
use crate::error::{Result, Status};
use crate::filter::{BloomFilterPolicy, FilterBlockBuilder};
use crate::key::{compare_internal_keys, extract_user_key};

use super::block::{put_index_entry, put_record};
use super::{BlockHandle, Footer, BLOCK_TRAILER_SIZE};

/// Builder for creating new tables from sorted entries
pub struct TableBuilder {
    file: Box<dyn WritableFile>,
    block_size: usize,
    /// Current write position
    offset: u64,
    /// Records of the data block being filled
    data_block: Vec<u8>,
    last_key: Vec<u8>,
    num_entries: u64,
    /// One entry per flushed data block: (last key, handle)
    index: Vec<(Vec<u8>, BlockHandle)>,
    filter: Option<FilterBlockBuilder>,
}

impl TableBuilder {
    /// Entries go to `file`; call `add()` in sorted order, then `finish()`
    pub fn new(options: &Options, file: Box<dyn WritableFile>) -> Self {
        let filter = options
            .filter_bits_per_key
            .filter(|&bits| bits > 0)
            .map(|bits| {
                let mut filter = FilterBlockBuilder::with_base_lg(
                    Arc::new(BloomFilterPolicy::new(bits)),
                    options.filter_base_lg,
                );
                filter.start_block(0);
                filter
            });

        Self {
            file,
            block_size: options.block_size.max(1),
            offset: 0,
            data_block: Vec::with_capacity(options.block_size),
            last_key: Vec::new(),
            num_entries: 0,
            index: Vec::new(),
            filter,
        }
    }

    /// Add an entry; `key` is an encoded internal key greater than any added so far
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.num_entries > 0 && compare_internal_keys(key, &self.last_key) != Ordering::Greater {
            return Err(Status::invalid_argument("table keys must be added in ascending order"));
        }

        if let Some(filter) = self.filter.as_mut() {
            filter.add_key(extract_user_key(key));
        }

        put_record(&mut self.data_block, key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        if self.data_block.len() >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Write the filter block, index block, and footer; returns the file size
    pub fn finish(mut self) -> Result<u64> {
        self.flush_block()?;

        let filter = match self.filter.take() {
            Some(filter) => {
                let contents = filter.finish();
                let handle = BlockHandle {
                    offset: self.offset,
                    size: contents.len() as u64,
                };
                self.file.append(&contents)?;
                self.offset += handle.size;
                handle
            }
            None => BlockHandle::default(),
        };

        let mut index_block = Vec::new();
        for (last_key, handle) in &self.index {
            put_index_entry(&mut index_block, last_key, *handle);
        }
        let index = self.write_block(&index_block)?;

        let footer = Footer { filter, index }.encode();
        self.file.append(&footer)?;
        self.offset += footer.len() as u64;
        self.file.sync()?;

        Ok(self.offset)
    }

    /// Drop the builder without writing the remaining structures
    pub fn abandon(self) {}

    fn flush_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let block = std::mem::take(&mut self.data_block);
        let handle = self.write_block(&block)?;
        self.index.push((self.last_key.clone(), handle));

        self.data_block = block;
        self.data_block.clear();

        if let Some(filter) = self.filter.as_mut() {
            filter.start_block(self.offset);
        }
        Ok(())
    }

    fn write_block(&mut self, contents: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle {
            offset: self.offset,
            size: contents.len() as u64,
        };
        self.file.append(contents)?;
        self.file.append(&crc32fast::hash(contents).to_le_bytes())?;
        self.offset += handle.size + BLOCK_TRAILER_SIZE;
        Ok(handle)
    }
}

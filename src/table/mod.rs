//! Table Module
//!
//! Immutable on-disk sorted tables of internal keys.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Blocks (variable)                                  │
//! │   [klen: varint32][internal key][vlen: varint32][value] │
//! │   ... repeated up to ~block_size bytes ...              │
//! │   followed by CRC32 of the block (fixed32)              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Filter Block (optional, see filter::block)              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block                                             │
//! │   [klen: varint32][last key][offset: u64][size: u64]    │
//! │   ... one entry per data block, then CRC32 ...          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (40 bytes)                                       │
//! │   filter handle (16) | index handle (16) | magic (8)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! Data block offsets key the filter block: the filter for a block is found
//! from the block's starting offset.

mod block;
mod builder;
mod iterator;
mod reader;

use std::path::Path;

use crate::config::Options;
use crate::env::{table_file_name, Env};
use crate::error::{Result, Status};
use crate::key::{InternalKey, SequenceNumber, ValueType};

pub use builder::TableBuilder;
pub use iterator::TableIter;
pub use reader::Table;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Identifies a smrkv table ("SMRKVTB1")
pub(crate) const TABLE_MAGIC: u64 = 0x3142_5456_4b52_4d53;

/// Footer size: two block handles (16 each) + magic (8)
pub(crate) const FOOTER_SIZE: u64 = 40;

/// Every data and index block is followed by its CRC32
pub(crate) const BLOCK_TRAILER_SIZE: u64 = 4;

// =============================================================================
// Block handles and footer
// =============================================================================

/// Location of a block within a table file (size excludes the trailer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub filter: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut out = [0u8; FOOTER_SIZE as usize];
        out[0..8].copy_from_slice(&self.filter.offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.filter.size.to_le_bytes());
        out[16..24].copy_from_slice(&self.index.offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.index.size.to_le_bytes());
        out[32..40].copy_from_slice(&TABLE_MAGIC.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE as usize {
            return Err(Status::corruption("truncated table footer"));
        }
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[i * 8..i * 8 + 8]);
            u64::from_le_bytes(buf)
        };
        if word(4) != TABLE_MAGIC {
            return Err(Status::corruption("not a table (bad magic number)"));
        }
        Ok(Self {
            filter: BlockHandle {
                offset: word(0),
                size: word(1),
            },
            index: BlockHandle {
                offset: word(2),
                size: word(3),
            },
        })
    }
}

// =============================================================================
// Lookup results and file metadata
// =============================================================================

/// Newest entry for a user key at or below a lookup sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
    /// Encoded value; empty for deletions
    pub value: Vec<u8>,
}

/// Describes a finished table file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaData {
    pub number: u64,
    pub level: u32,
    /// Zero when no entries were written (the file is removed)
    pub file_size: u64,
    pub smallest: Option<InternalKey>,
    pub largest: Option<InternalKey>,
}

/// Write `entries` (sorted internal keys) to table `number` at `level`
pub fn build_table<I, K, V>(
    env: &dyn Env,
    options: &Options,
    number: u64,
    level: u32,
    entries: I,
) -> Result<FileMetaData>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let path = table_file_name(&options.db_path, number, level);
    if let Some(parent) = path.parent() {
        env.create_dir_all(parent)?;
    }

    let mut meta = FileMetaData {
        number,
        level,
        file_size: 0,
        smallest: None,
        largest: None,
    };

    let result = write_entries(env, options, &path, entries, &mut meta);
    match result {
        Ok(file_size) if file_size > 0 => {
            meta.file_size = file_size;
            tracing::debug!(number, level, file_size, "built table");
            Ok(meta)
        }
        Ok(_) => {
            env.remove_file(&path)?;
            Ok(meta)
        }
        Err(e) => {
            tracing::warn!(number, level, error = %e, "table build failed");
            let _ = env.remove_file(&path);
            Err(e)
        }
    }
}

fn write_entries<I, K, V>(
    env: &dyn Env,
    options: &Options,
    path: &Path,
    entries: I,
    meta: &mut FileMetaData,
) -> Result<u64>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let file = env.new_writable_file(path)?;
    let mut builder = TableBuilder::new(options, file);
    let mut last: Option<Vec<u8>> = None;

    for (key, value) in entries {
        let key = key.as_ref();
        builder.add(key, value.as_ref())?;
        if meta.smallest.is_none() {
            meta.smallest = Some(InternalKey::from_encoded(key.to_vec()));
        }
        last = Some(key.to_vec());
    }
    meta.largest = last.map(InternalKey::from_encoded);

    if builder.num_entries() == 0 {
        builder.abandon();
        return Ok(0);
    }
    builder.finish()
}

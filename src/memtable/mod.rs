//! MemTable Module
//!
//! In-memory table for recent writes, ordered by internal key.
//!
//! ## Responsibilities
//! - Hold every applied mutation until it is flushed to a table
//! - Answer point lookups at a sequence number
//! - Ordered iteration for table creation
//! - Track memory usage for flush triggers
//!
//! ## Data Structure Choice
//! Internal keys are copied into the memtable's [`Arena`](crate::arena::Arena)
//! and indexed by a BTreeMap ordered by internal key (user key ascending,
//! newest sequence first). Values are held beside the keys as staged values,
//! so pooled payloads stay leased until the memtable is dropped.

mod table;

pub use table::MemTable;

use crate::value::StagedValue;

/// Result of a memtable point lookup
#[derive(Debug)]
pub enum MemTableGet<'a> {
    /// A live value
    Value(&'a StagedValue),

    /// The newest visible entry is a deletion
    Deleted,
}

impl<'a> MemTableGet<'a> {
    pub fn value(&self) -> Option<&'a StagedValue> {
        match *self {
            MemTableGet::Value(v) => Some(v),
            MemTableGet::Deleted => None,
        }
    }
}

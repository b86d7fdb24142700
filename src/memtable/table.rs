//! MemTable implementation
//!
//! Arena-backed keys indexed by a BTreeMap.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::arena::Arena;
use crate::key::{compare_internal_keys, pack_sequence_and_type, parse_internal_key, LookupKey, SequenceNumber, ValueType};
use crate::value::StagedValue;

use super::MemTableGet;

/// An internal key living in the memtable's arena (or, for lookups, in
/// caller memory that outlives the lookup)
#[derive(Clone, Copy)]
struct ArenaKey {
    ptr: *const u8,
    len: usize,
}

impl ArenaKey {
    fn new(bytes: &[u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// SAFETY: the caller must ensure the referenced bytes are still alive
    /// for `'a`. Stored keys point into the arena, which is dropped after the
    /// map; lookup keys are only compared during the call that created them.
    unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

impl PartialEq for ArenaKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ArenaKey {}

impl PartialOrd for ArenaKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArenaKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // SAFETY: see `as_slice`
        unsafe { compare_internal_keys(self.as_slice(), other.as_slice()) }
    }
}

/// In-memory table for recent writes
///
/// Writes take `&mut self`; the table is not internally synchronized.
pub struct MemTable {
    // Declared before `arena` so the index is dropped first
    table: BTreeMap<ArenaKey, Option<StagedValue>>,
    arena: Arena,
    value_bytes: usize,
}

// SAFETY: ArenaKey pointers only reference the owned arena, which moves
// with the memtable.
unsafe impl Send for MemTable {}

impl MemTable {
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
            arena: Arena::new(),
            value_bytes: 0,
        }
    }

    /// Record `key` at `sequence`; `value` is None for deletions
    pub fn add(
        &mut self,
        sequence: SequenceNumber,
        value_type: ValueType,
        key: &[u8],
        value: Option<StagedValue>,
    ) {
        let ikey_len = key.len() + 8;
        let buf = self.arena.allocate(ikey_len);
        buf[..key.len()].copy_from_slice(key);
        buf[key.len()..].copy_from_slice(&pack_sequence_and_type(sequence, value_type).to_le_bytes());
        let arena_key = ArenaKey::new(buf);

        let value = match value_type {
            ValueType::Value => value,
            ValueType::Deletion => None,
        };
        if let Some(v) = &value {
            self.value_bytes += v.encoded_len();
        }
        if let Some(Some(old)) = self.table.insert(arena_key, value) {
            self.value_bytes -= old.encoded_len();
        }
    }

    /// Newest entry for the user key visible at the lookup sequence
    pub fn get(&self, key: &LookupKey) -> Option<MemTableGet<'_>> {
        let seek = ArenaKey::new(key.internal_key());
        let (found, value) = self.table.range(seek..).next()?;
        // SAFETY: stored keys live in self.arena
        let parsed = parse_internal_key(unsafe { found.as_slice() })?;
        if parsed.user_key != key.user_key() {
            return None;
        }
        match (parsed.value_type, value) {
            (ValueType::Value, Some(v)) => Some(MemTableGet::Value(v)),
            _ => Some(MemTableGet::Deleted),
        }
    }

    /// Entries in internal-key order: (encoded internal key, value)
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&StagedValue>)> + '_ {
        self.table
            .iter()
            // SAFETY: stored keys live in self.arena, borrowed for '_
            .map(|(k, v)| (unsafe { k.as_slice() }, v.as_ref()))
    }

    /// Entries encoded for a table: (internal key, encoded value or empty)
    pub fn table_entries(&self) -> impl Iterator<Item = (&[u8], Vec<u8>)> + '_ {
        self.iter()
            .map(|(k, v)| (k, v.map(StagedValue::encode).unwrap_or_default()))
    }

    /// Arena bytes plus staged value bytes
    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage() + self.value_bytes
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

//! Batch record handlers

use crate::key::{SequenceNumber, ValueType};
use crate::memtable::MemTable;
use crate::value::StagedValue;

/// Receives the records of a batch, in order, as it is applied
pub trait Handler {
    /// Ownership of the staged value passes to the handler
    fn put(&mut self, key: &[u8], value: StagedValue);

    fn delete(&mut self, key: &[u8]);
}

/// Applies records to a memtable with consecutive sequence numbers
pub struct MemTableInserter<'a> {
    sequence: SequenceNumber,
    mem: &'a mut MemTable,
}

impl<'a> MemTableInserter<'a> {
    /// The first record gets `sequence`
    pub fn new(sequence: SequenceNumber, mem: &'a mut MemTable) -> Self {
        Self { sequence, mem }
    }

    /// Sequence the next record will get
    pub fn next_sequence(&self) -> SequenceNumber {
        self.sequence
    }
}

impl Handler for MemTableInserter<'_> {
    fn put(&mut self, key: &[u8], value: StagedValue) {
        self.mem.add(self.sequence, ValueType::Value, key, Some(value));
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.mem.add(self.sequence, ValueType::Deletion, key, None);
        self.sequence += 1;
    }
}

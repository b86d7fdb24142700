//! Write Batch Module
//!
//! An atomic group of mutations, serialized once for the durability log and
//! applied to the memtable as a unit.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                       │
//! │   Sequence: u64 (8) | Count: u32 (4)                    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Records (count of them)                                 │
//! │   [Type: u8][KeyLen: varint32][Key]                     │
//! │   [Value] for Type = Value (see value::StagedValue)     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! Building → Serialized → (Deserializing →) Applied. Applying a batch
//! consumes its records; a second `iterate` reports the count mismatch.

mod handler;

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::coding::{get_fixed32, get_fixed64, get_length_prefixed_slice, get_u8, put_fixed32, put_fixed64, put_length_prefixed_slice, varint_length};
use crate::error::{Result, Status};
use crate::key::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};
use crate::mem::{BufferPool, HeapBufferPool};
use crate::memtable::MemTable;
use crate::value::{StagedValue, ValueKind};

pub use handler::{Handler, MemTableInserter};

/// Header size: Sequence (8) + Count (4) = 12 bytes
pub const HEADER_SIZE: usize = 12;

/// Default size above which values are staged in pooled buffers
pub const DEFAULT_INLINE_THRESHOLD: usize = 8192;

/// A single mutation
#[derive(Debug)]
enum Record {
    Put { key: Vec<u8>, value: StagedValue },
    Delete { key: Vec<u8> },
}

impl Record {
    fn encoded_len(&self) -> usize {
        match self {
            Record::Put { key, value } => {
                1 + varint_length(key.len() as u64) + key.len() + value.encoded_len()
            }
            Record::Delete { key } => 1 + varint_length(key.len() as u64) + key.len(),
        }
    }

    fn encode_to(&self, dst: &mut Vec<u8>) {
        match self {
            Record::Put { key, value } => {
                dst.push(ValueType::Value as u8);
                put_length_prefixed_slice(dst, key);
                value.encode_to(dst);
            }
            Record::Delete { key } => {
                dst.push(ValueType::Deletion as u8);
                put_length_prefixed_slice(dst, key);
            }
        }
    }
}

/// Ordered collection of puts and deletes applied atomically
pub struct WriteBatch {
    sequence: SequenceNumber,
    count: u32,
    records: VecDeque<Record>,
    /// Serialized form not yet decoded (set by `set_contents`)
    contents: Option<Bytes>,
    inline_threshold: usize,
    pool: Arc<dyn BufferPool>,
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("sequence", &self.sequence)
            .field("count", &self.count)
            .field("records", &self.records.len())
            .field("raw", &self.contents.as_ref().map(Bytes::len))
            .finish()
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    /// Empty batch staging large values in a private unbounded pool
    pub fn new() -> Self {
        Self::with_options(DEFAULT_INLINE_THRESHOLD, Arc::new(HeapBufferPool::unbounded()))
    }

    /// Empty batch staging values over `inline_threshold` bytes in `pool`
    pub fn with_options(inline_threshold: usize, pool: Arc<dyn BufferPool>) -> Self {
        Self {
            sequence: 0,
            count: 0,
            records: VecDeque::new(),
            contents: None,
            inline_threshold,
            pool,
        }
    }

    /// Batch holding serialized `contents`, decoded lazily by `iterate`
    pub fn from_contents(contents: Bytes, inline_threshold: usize, pool: Arc<dyn BufferPool>) -> Self {
        let mut batch = Self::with_options(inline_threshold, pool);
        batch.set_contents(contents);
        batch
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Stage `data` under `key`; large payloads are copied into the pool
    pub fn put(&mut self, key: &[u8], kind: ValueKind, header: &[u8], data: &[u8]) -> Result<()> {
        let value = StagedValue::stage(kind, header, data, self.inline_threshold, &self.pool)?;
        self.put_value(key, value);
        Ok(())
    }

    /// Add an already staged value
    pub fn put_value(&mut self, key: &[u8], value: StagedValue) {
        self.records.push_back(Record::Put {
            key: key.to_vec(),
            value,
        });
        self.count += 1;
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.records.push_back(Record::Delete { key: key.to_vec() });
        self.count += 1;
    }

    /// Drop every record (releasing pooled buffers) and reset the header
    pub fn clear(&mut self) {
        self.records.clear();
        self.contents = None;
        self.count = 0;
        self.sequence = 0;
    }

    // =========================================================================
    // Header
    // =========================================================================

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Assign the sequence of the first record; set once at commit
    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        self.sequence = sequence;
    }

    /// Serialized size in bytes
    pub fn approximate_size(&self) -> usize {
        match &self.contents {
            Some(raw) => raw.len(),
            None => HEADER_SIZE + self.records.iter().map(Record::encoded_len).sum::<usize>(),
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Wire form of the batch
    pub fn contents(&self) -> Bytes {
        if let Some(raw) = &self.contents {
            return raw.clone();
        }
        let mut out = Vec::with_capacity(self.approximate_size());
        put_fixed64(&mut out, self.sequence);
        put_fixed32(&mut out, self.count);
        for record in &self.records {
            record.encode_to(&mut out);
        }
        Bytes::from(out)
    }

    /// Replace the batch with serialized `contents`
    ///
    /// The header is read immediately when present; records are decoded by
    /// the next `iterate`.
    pub fn set_contents(&mut self, contents: Bytes) {
        self.records.clear();
        let mut header = &contents[..];
        match (get_fixed64(&mut header), get_fixed32(&mut header)) {
            (Some(sequence), Some(count)) => {
                self.sequence = sequence;
                self.count = count;
            }
            _ => {
                self.sequence = 0;
                self.count = 0;
            }
        }
        self.contents = Some(contents);
    }

    // =========================================================================
    // Application
    // =========================================================================

    /// Decode (if needed) and hand every record to `handler` in order
    ///
    /// Records are consumed. The whole batch is decoded before the first
    /// dispatch, so a corrupt batch is never partially applied.
    pub fn iterate(&mut self, handler: &mut dyn Handler) -> Result<()> {
        self.materialize()?;
        self.dispatch(handler)
    }

    /// Apply the batch to `mem`, numbering records from `sequence()`
    pub fn insert_into(&mut self, mem: &mut MemTable) -> Result<()> {
        self.materialize()?;
        check_sequence_range(self.sequence, self.count)?;
        let mut inserter = MemTableInserter::new(self.sequence, mem);
        self.dispatch(&mut inserter)
    }

    /// Move every record of `src` onto the end of `dst`
    ///
    /// Counts are summed, `src` is left empty, and neither sequence changes.
    pub fn append(dst: &mut WriteBatch, src: &mut WriteBatch) -> Result<()> {
        dst.materialize()?;
        src.materialize()?;
        dst.count += src.count;
        dst.records.append(&mut src.records);
        src.count = 0;
        Ok(())
    }

    fn materialize(&mut self) -> Result<()> {
        let Some(contents) = self.contents.take() else {
            return Ok(());
        };
        match self.decode(&contents) {
            Ok(records) => {
                self.records = records;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(len = contents.len(), error = %e, "rejecting write batch");
                self.contents = Some(contents);
                Err(e)
            }
        }
    }

    fn decode(&mut self, contents: &[u8]) -> Result<VecDeque<Record>> {
        let mut input = contents;
        let (Some(sequence), Some(count)) = (get_fixed64(&mut input), get_fixed32(&mut input)) else {
            return Err(Status::corruption("malformed WriteBatch (too small)"));
        };
        self.sequence = sequence;
        self.count = count;
        check_sequence_range(sequence, count)?;

        let mut records = VecDeque::new();
        for _ in 0..count {
            if input.is_empty() {
                return Err(Status::corruption("WriteBatch has wrong count"));
            }
            let tag = get_u8(&mut input).unwrap_or_default();
            let key = get_length_prefixed_slice(&mut input)
                .ok_or_else(|| Status::corruption("bad WriteBatch key"))?
                .to_vec();
            let record = match ValueType::from_u8(tag) {
                Some(ValueType::Value) => {
                    let value = StagedValue::decode_from(&mut input, self.inline_threshold, &self.pool)?;
                    Record::Put { key, value }
                }
                Some(ValueType::Deletion) => Record::Delete { key },
                None => return Err(Status::corruption(format!("unknown WriteBatch tag {}", tag))),
            };
            records.push_back(record);
        }

        if !input.is_empty() {
            return Err(Status::corruption("WriteBatch has wrong count"));
        }
        Ok(records)
    }

    fn dispatch(&mut self, handler: &mut dyn Handler) -> Result<()> {
        let mut found = 0u32;
        while let Some(record) = self.records.pop_front() {
            found += 1;
            match record {
                Record::Put { key, value } => handler.put(&key, value),
                Record::Delete { key } => handler.delete(&key),
            }
        }
        if found != self.count {
            return Err(Status::corruption(format!(
                "WriteBatch has wrong count: header says {}, found {}",
                self.count, found
            )));
        }
        Ok(())
    }
}

/// Records get `sequence..sequence + count`; all must fit the 56-bit tag
fn check_sequence_range(sequence: SequenceNumber, count: u32) -> Result<()> {
    match sequence.checked_add(u64::from(count)) {
        Some(end) if end <= MAX_SEQUENCE_NUMBER + 1 => Ok(()),
        _ => Err(Status::corruption(format!(
            "WriteBatch sequence {} with {} records exceeds the sequence space",
            sequence, count
        ))),
    }
}

//! Log Recovery
//!
//! Replays every batch in a durability log into a memtable.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::batch::WriteBatch;
use crate::env::Env;
use crate::error::Result;
use crate::key::SequenceNumber;
use crate::mem::BufferPool;
use crate::memtable::MemTable;

use super::LogReader;

/// Result of a recovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryResult {
    /// Batches applied
    pub batches: u64,

    /// Records applied across all batches
    pub records: u64,

    /// Sequence of the last record applied (0 if none)
    pub last_sequence: SequenceNumber,
}

/// Replay the log at `path` into `mem`
///
/// A checksum failure or corrupt batch aborts recovery; batches already
/// applied stay in `mem`, and the failing batch is not applied at all.
pub fn recover_log(
    env: &dyn Env,
    path: &Path,
    mem: &mut MemTable,
    pool: Arc<dyn BufferPool>,
    inline_threshold: usize,
) -> Result<RecoveryResult> {
    let reader = LogReader::new(env.new_random_access_file(path)?)?;
    let mut result = RecoveryResult::default();

    for record in reader {
        let record = record?;
        let mut batch = WriteBatch::from_contents(Bytes::from(record), inline_threshold, Arc::clone(&pool));
        batch.insert_into(mem)?;

        let count = u64::from(batch.count());
        if count > 0 {
            result.last_sequence = result.last_sequence.max(batch.sequence() + count - 1);
        }
        result.batches += 1;
        result.records += count;
    }

    tracing::info!(
        path = %path.display(),
        batches = result.batches,
        records = result.records,
        last_sequence = result.last_sequence,
        "recovered log"
    );
    Ok(result)
}

//! Durability Log Module
//!
//! Append-only log of serialized write batches, replayed on recovery.
//!
//! ## Responsibilities
//! - Append each committed batch before it is applied
//! - CRC32 checksums for corruption detection
//! - Crash recovery and replay into a memtable
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch contents  │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch contents  │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! The CRC covers the payload only. A record cut short at the end of the
//! file is a torn write and ends the log; a CRC mismatch is corruption.

mod reader;
mod recovery;
mod writer;

pub use reader::LogReader;
pub use recovery::{recover_log, RecoveryResult};
pub use writer::LogWriter;

/// Record header: CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 8;

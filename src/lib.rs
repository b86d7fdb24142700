//! # smrkv
//!
//! Data-path core of a log-structured key-value engine:
//! - Atomic write batches with a durable wire format
//! - Arena-backed memtable for recent writes
//! - Sorted tables with per-range bloom filter blocks
//! - A reference-counted, LRU table cache safe for concurrent readers
//! - Status values with a rotating diagnostic error log
//!
//! ## Architecture Overview
//!
//! ```text
//!   Writer                                    Reader
//!     │                                          │
//! ┌───▼─────────┐   contents()   ┌──────────┐   ┌▼────────────┐
//! │ WriteBatch  ├───────────────►│   Log    │   │ TableCache  │
//! └───┬─────────┘                └────┬─────┘   │  (Mutex +   │
//!     │ insert_into          recover  │         │   LRU)      │
//! ┌───▼─────────┐◄────────────────────┘         └──────┬──────┘
//! │  MemTable   │                                      │
//! │  (Arena)    │                               ┌──────▼──────┐
//! └───┬─────────┘                               │    Table    │
//!     │ build_table                             │ index+filter│
//!     └────────────────────────────────────────►└─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod diagnostics;
pub mod config;

pub mod arena;
pub mod coding;
pub mod key;
pub mod env;
pub mod mem;
pub mod value;

pub mod batch;
pub mod memtable;
pub mod wal;

pub mod cache;
pub mod filter;
pub mod table;
pub mod table_cache;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use arena::Arena;
pub use batch::{Handler, WriteBatch};
pub use config::{Options, ReadOptions};
pub use error::{Code, Result, Status};
pub use memtable::MemTable;
pub use table_cache::{TableCache, TableHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of smrkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Storage environment
//!
//! The engine never touches the filesystem directly; it goes through an
//! [`Env`]. Production uses [`PosixEnv`]; tests wrap it to count opens,
//! inject failures, or track file lifetimes.
//!
//! ## Responsibilities
//! - Open files for positional reads (tables)
//! - Open files for appends (tables being built, durability log)
//! - Basic namespace operations (exists, remove, rename, mkdir)

mod filename;
mod posix;

use std::path::Path;

use crate::error::{Code, Result, Status};

pub use filename::{legacy_table_file_name, log_file_name, parse_table_file_name, table_file_name};
pub use posix::PosixEnv;

/// Byte-addressable file opened for positional reads
pub trait RandomAccessFile: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Current file length in bytes
    fn size(&self) -> Result<u64>;
}

/// Sequentially written file
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Flush and make durable
    fn sync(&mut self) -> Result<()>;
}

/// Filesystem abstraction supplied by the device layer
pub trait Env: Send + Sync {
    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>>;

    /// Create or truncate `path` for writing
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    /// Open `path` for appending, creating it if needed
    fn new_appendable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    fn file_exists(&self, path: &Path) -> bool;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Attach the path to an I/O failure
pub(crate) fn io_status(path: &Path, e: std::io::Error) -> Status {
    Status::with_context(Code::IoError, path.display().to_string(), e.to_string())
}

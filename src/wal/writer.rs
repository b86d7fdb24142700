//! Log Writer
//!
//! Appends checksummed records to the durability log.

use crate::batch::WriteBatch;
use crate::env::WritableFile;
use crate::error::{Result, Status};

/// Writes records to a log file
pub struct LogWriter {
    file: Box<dyn WritableFile>,
    records_written: u64,
    bytes_written: u64,
}

impl LogWriter {
    /// Append to `file`, which may already hold records
    pub fn new(file: Box<dyn WritableFile>) -> Self {
        Self {
            file,
            records_written: 0,
            bytes_written: 0,
        }
    }

    /// Append one record: [crc][len][payload]
    pub fn add_record(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Status::invalid_argument(format!("log record of {} bytes is too large", payload.len())))?;

        let mut header = [0u8; super::HEADER_SIZE];
        header[0..4].copy_from_slice(&crc32fast::hash(payload).to_le_bytes());
        header[4..8].copy_from_slice(&len.to_le_bytes());

        self.file.append(&header)?;
        self.file.append(payload)?;
        self.file.flush()?;

        self.records_written += 1;
        self.bytes_written += (super::HEADER_SIZE + payload.len()) as u64;
        Ok(())
    }

    /// Append the serialized form of `batch`
    pub fn add_batch(&mut self, batch: &WriteBatch) -> Result<()> {
        self.add_record(&batch.contents())
    }

    /// Force records to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

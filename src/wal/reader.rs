//! Log Reader
//!
//! Reads whole records back from the durability log.

use crate::env::RandomAccessFile;
use crate::error::{Result, Status};

use super::HEADER_SIZE;

/// Reads records from a log file
pub struct LogReader {
    file: Box<dyn RandomAccessFile>,
    position: u64,
    size: u64,
    failed: bool,
}

impl LogReader {
    pub fn new(file: Box<dyn RandomAccessFile>) -> Result<Self> {
        let size = file.size()?;
        Ok(Self {
            file,
            position: 0,
            size,
            failed: false,
        })
    }

    /// Offset of the next record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at end of log, including when the final record was
    /// only partially written.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let remaining = self.size - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.log_torn_tail(remaining);
            return Ok(None);
        }

        let header = self.file.read_at(self.position, HEADER_SIZE)?;
        let expected_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;

        if remaining - (HEADER_SIZE as u64) < len {
            self.log_torn_tail(remaining);
            return Ok(None);
        }

        let payload = self.file.read_at(self.position + HEADER_SIZE as u64, len as usize)?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(Status::corruption(format!(
                "log record checksum mismatch at offset {}: expected {:#010x}, got {:#010x}",
                self.position, expected_crc, actual_crc
            )));
        }

        self.position += HEADER_SIZE as u64 + len;
        Ok(Some(payload))
    }

    fn log_torn_tail(&mut self, remaining: u64) {
        tracing::warn!(offset = self.position, bytes = remaining, "ignoring truncated record at end of log");
        self.position = self.size;
    }
}

impl Iterator for LogReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

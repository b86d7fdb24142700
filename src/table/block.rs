//! Block encoding shared by data and index blocks

use crate::coding::{get_fixed64, get_varint32, put_varint32};
use crate::env::RandomAccessFile;
use crate::error::{Result, Status};

use super::{BlockHandle, BLOCK_TRAILER_SIZE};

/// Append a data record: `[klen][key][vlen][value]`
pub(super) fn put_record(dst: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    put_varint32(dst, key.len() as u32);
    dst.extend_from_slice(key);
    put_varint32(dst, value.len() as u32);
    dst.extend_from_slice(value);
}

/// Append an index record: `[klen][last key][offset][size]`
pub(super) fn put_index_entry(dst: &mut Vec<u8>, last_key: &[u8], handle: BlockHandle) {
    put_varint32(dst, last_key.len() as u32);
    dst.extend_from_slice(last_key);
    dst.extend_from_slice(&handle.offset.to_le_bytes());
    dst.extend_from_slice(&handle.size.to_le_bytes());
}

/// Read a block and strip (optionally verifying) its CRC trailer
pub(super) fn read_block(
    file: &dyn RandomAccessFile,
    handle: BlockHandle,
    verify_checksum: bool,
) -> Result<Vec<u8>> {
    let (Some(len), Ok(body_len)) = (
        handle
            .size
            .checked_add(BLOCK_TRAILER_SIZE)
            .and_then(|len| usize::try_from(len).ok()),
        usize::try_from(handle.size),
    ) else {
        return Err(Status::corruption(format!("block handle at offset {} is too large", handle.offset)));
    };
    let mut data = file.read_at(handle.offset, len)?;
    if data.len() < len {
        return Err(Status::corruption(format!("truncated block at offset {}", handle.offset)));
    }

    if verify_checksum {
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&data[body_len..]);
        let expected = u32::from_le_bytes(stored);
        let actual = crc32fast::hash(&data[..body_len]);
        if expected != actual {
            return Err(Status::corruption(format!(
                "block checksum mismatch at offset {}: expected {:#010x}, got {:#010x}",
                handle.offset, expected, actual
            )));
        }
    }
    data.truncate(body_len);
    Ok(data)
}

/// Iterates `(key, value)` records of a data block
pub(super) struct BlockRecords<'a> {
    input: &'a [u8],
    failed: bool,
}

impl<'a> BlockRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            input: data,
            failed: false,
        }
    }

    fn take(&mut self) -> Option<&'a [u8]> {
        let len = get_varint32(&mut self.input)? as usize;
        if self.input.len() < len {
            return None;
        }
        let (bytes, rest) = self.input.split_at(len);
        self.input = rest;
        Some(bytes)
    }
}

impl<'a> Iterator for BlockRecords<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }
        match self.take().and_then(|k| self.take().map(|v| (k, v))) {
            Some(record) => Some(Ok(record)),
            None => {
                self.failed = true;
                Some(Err(Status::corruption("bad entry in data block")))
            }
        }
    }
}

/// Parse an index block into `(last key, handle)` pairs
pub(super) fn parse_index(mut input: &[u8]) -> Result<Vec<(Vec<u8>, BlockHandle)>> {
    let mut entries = Vec::new();
    while !input.is_empty() {
        let entry = (|| {
            let len = get_varint32(&mut input)? as usize;
            if input.len() < len {
                return None;
            }
            let (key, rest) = input.split_at(len);
            input = rest;
            let offset = get_fixed64(&mut input)?;
            let size = get_fixed64(&mut input)?;
            Some((key.to_vec(), BlockHandle { offset, size }))
        })();
        match entry {
            Some(entry) => entries.push(entry),
            None => return Err(Status::corruption("bad entry in index block")),
        }
    }
    Ok(entries)
}

//! Staged values
//!
//! A value travelling through the write path: a small structured header
//! plus a payload that is either held inline or leased from a buffer pool.
//!
//! ## Encoding
//! ```text
//! ┌──────────┬──────────────────────┬────────┬─────────────────────┬─────────┐
//! │ kind: u8 │ header_len: varint32 │ header │ value_len: varint32 │ payload │
//! └──────────┴──────────────────────┴────────┴─────────────────────┴─────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::coding::{get_length_prefixed_slice, get_u8, get_varint32, get_varint64, put_length_prefixed_slice, put_varint32, put_varint64, varint_length};
use crate::error::{Result, Status};
use crate::mem::{BufferPool, PoolBuffer};

/// Where the value's payload lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Payload is the user value
    Internal,
    /// Payload is an [`ExternalValueInfo`] locating the value elsewhere
    External,
}

impl ValueKind {
    fn wire_tag(self) -> u8 {
        match self {
            ValueKind::Internal => 2,
            ValueKind::External => 3,
        }
    }

    fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(ValueKind::Internal),
            3 => Some(ValueKind::External),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Inline(Bytes),
    Pooled(PoolBuffer),
}

impl Payload {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Inline(bytes) => bytes,
            Payload::Pooled(buf) => buf,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// A value owned by the write path, independent of the caller's buffers
#[derive(Debug)]
pub struct StagedValue {
    kind: ValueKind,
    header: Bytes,
    payload: Payload,
}

impl StagedValue {
    /// Hold the payload inline regardless of size
    pub fn inline(kind: ValueKind, header: &[u8], data: &[u8]) -> Self {
        Self {
            kind,
            header: Bytes::copy_from_slice(header),
            payload: Payload::Inline(Bytes::copy_from_slice(data)),
        }
    }

    /// Copy `header` and `data` into owned storage
    ///
    /// Payloads over `threshold` bytes are leased from `pool`; an exhausted
    /// pool yields NoSpaceAvailable.
    pub fn stage(
        kind: ValueKind,
        header: &[u8],
        data: &[u8],
        threshold: usize,
        pool: &Arc<dyn BufferPool>,
    ) -> Result<Self> {
        let payload = if data.len() > threshold {
            let buf = PoolBuffer::copy_from(pool, data).ok_or_else(|| {
                Status::no_space(format!("cannot stage {} byte value", data.len()))
            })?;
            Payload::Pooled(buf)
        } else {
            Payload::Inline(Bytes::copy_from_slice(data))
        };
        Ok(Self {
            kind,
            header: Bytes::copy_from_slice(header),
            payload,
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        self.payload.as_slice()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.payload, Payload::Pooled(_))
    }

    /// Location of the value for External kinds
    pub fn external_info(&self) -> Result<ExternalValueInfo> {
        if self.kind != ValueKind::External {
            return Err(Status::invalid_argument("value is stored internally"));
        }
        ExternalValueInfo::decode(self.data())
    }

    pub fn encoded_len(&self) -> usize {
        1 + varint_length(self.header.len() as u64)
            + self.header.len()
            + varint_length(self.payload.len() as u64)
            + self.payload.len()
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        dst.push(self.kind.wire_tag());
        put_length_prefixed_slice(dst, &self.header);
        put_length_prefixed_slice(dst, self.data());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }

    /// Decode one value from the front of `input`, staging its payload
    pub fn decode_from(input: &mut &[u8], threshold: usize, pool: &Arc<dyn BufferPool>) -> Result<Self> {
        let kind = get_u8(input)
            .and_then(ValueKind::from_wire_tag)
            .ok_or_else(|| Status::corruption("bad value kind"))?;
        let header = get_length_prefixed_slice(input).ok_or_else(|| Status::corruption("bad value header"))?;
        let data = get_length_prefixed_slice(input).ok_or_else(|| Status::corruption("bad value payload"))?;
        Self::stage(kind, header, data, threshold, pool)
    }

    /// Decode a complete encoded value, holding the payload inline
    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let kind = get_u8(&mut input)
            .and_then(ValueKind::from_wire_tag)
            .ok_or_else(|| Status::corruption("bad value kind"))?;
        let header = get_length_prefixed_slice(&mut input).ok_or_else(|| Status::corruption("bad value header"))?;
        let data = get_length_prefixed_slice(&mut input).ok_or_else(|| Status::corruption("bad value payload"))?;
        if !input.is_empty() {
            return Err(Status::corruption("trailing bytes after value"));
        }
        Ok(Self::inline(kind, header, data))
    }
}

/// Location of a value stored outside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalValueInfo {
    pub file_number: u64,
    pub offset: u32,
    pub size: u32,
}

impl ExternalValueInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        put_varint64(&mut out, self.file_number);
        put_varint32(&mut out, self.offset);
        put_varint32(&mut out, self.size);
        out
    }

    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let parsed = (|| {
            let file_number = get_varint64(&mut input)?;
            let offset = get_varint32(&mut input)?;
            let size = get_varint32(&mut input)?;
            Some(Self {
                file_number,
                offset,
                size,
            })
        })();
        parsed.ok_or_else(|| Status::corruption("bad external value location"))
    }
}

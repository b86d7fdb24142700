//! Binary coding helpers
//!
//! Little-endian fixed-width integers and LEB128-style varints, as used by
//! the batch wire format, filter block trailer and table format.
//!
//! Decoders take `&mut &[u8]` and advance the slice past what they consumed.
//! Malformed or truncated input yields `None`; nothing here panics on bad
//! data.

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.extend_from_slice(&value.to_le_bytes());
}

pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    dst.extend_from_slice(&value.to_le_bytes());
}

/// Decode a fixed32 from the first 4 bytes of `src` (caller checks length)
pub fn decode_fixed32(src: &[u8]) -> u32 {
    u32::from_le_bytes([src[0], src[1], src[2], src[3]])
}

/// Decode a fixed64 from the first 8 bytes of `src` (caller checks length)
pub fn decode_fixed64(src: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&src[..8]);
    u64::from_le_bytes(buf)
}

pub fn get_fixed32(input: &mut &[u8]) -> Option<u32> {
    if input.len() < 4 {
        return None;
    }
    let value = decode_fixed32(input);
    *input = &input[4..];
    Some(value)
}

pub fn get_fixed64(input: &mut &[u8]) -> Option<u64> {
    if input.len() < 8 {
        return None;
    }
    let value = decode_fixed64(input);
    *input = &input[8..];
    Some(value)
}

pub fn get_u8(input: &mut &[u8]) -> Option<u8> {
    let (&first, rest) = input.split_first()?;
    *input = rest;
    Some(first)
}

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, value as u64)
}

pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Number of bytes `put_varint64(value)` emits
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn get_varint32(input: &mut &[u8]) -> Option<u32> {
    let mut result: u32 = 0;
    for (i, &byte) in input.iter().enumerate().take(5) {
        let shift = 7 * i as u32;
        if shift == 28 && byte > 0x0f {
            return None;
        }
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            *input = &input[i + 1..];
            return Some(result);
        }
    }
    None
}

pub fn get_varint64(input: &mut &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    for (i, &byte) in input.iter().enumerate().take(10) {
        let shift = 7 * i as u32;
        if shift == 63 && byte > 0x01 {
            return None;
        }
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            *input = &input[i + 1..];
            return Some(result);
        }
    }
    None
}

/// Append `varint32(len) ++ bytes`
pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_varint32(dst, bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = get_varint32(input)? as usize;
    if input.len() < len {
        return None;
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Some(head)
}

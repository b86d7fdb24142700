//! Internal key format
//!
//! An internal key is `user_key ++ fixed64(sequence << 8 | type)`.
//!
//! Ordering: user key ascending (bytewise), then sequence descending, then
//! type descending. Iteration therefore yields the newest version of a user
//! key first.

use std::cmp::Ordering;

use crate::coding::{decode_fixed64, put_fixed64};

/// Monotonic write sequence number
pub type SequenceNumber = u64;

/// Largest sequence number representable in the 56-bit tag field
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Size of the packed sequence/type trailer
pub const TAG_SIZE: usize = 8;

/// Record type stored in the low byte of the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl ValueType {
    /// Type used when building a seek target: sorts before every other type
    /// at the same sequence number.
    pub const FOR_SEEK: ValueType = ValueType::Value;

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

/// Borrowed, decoded view of an internal key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

/// Split an encoded internal key; `None` when it is too short or carries an
/// unknown type.
pub fn parse_internal_key(encoded: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if encoded.len() < TAG_SIZE {
        return None;
    }
    let split = encoded.len() - TAG_SIZE;
    let tag = decode_fixed64(&encoded[split..]);
    Some(ParsedInternalKey {
        user_key: &encoded[..split],
        sequence: tag >> 8,
        value_type: ValueType::from_u8((tag & 0xff) as u8)?,
    })
}

/// User key portion of an encoded internal key
pub fn extract_user_key(encoded: &[u8]) -> &[u8] {
    &encoded[..encoded.len().saturating_sub(TAG_SIZE)]
}

/// Compare two encoded internal keys
pub fn compare_internal_keys(a: &[u8], b: &[u8]) -> Ordering {
    let (ua, ub) = (extract_user_key(a), extract_user_key(b));
    ua.cmp(ub).then_with(|| {
        let ta = tag_of(a);
        let tb = tag_of(b);
        // higher tag (newer sequence) sorts first
        tb.cmp(&ta)
    })
}

fn tag_of(encoded: &[u8]) -> u64 {
    if encoded.len() < TAG_SIZE {
        return 0;
    }
    decode_fixed64(&encoded[encoded.len() - TAG_SIZE..])
}

/// Owned encoded internal key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TAG_SIZE);
        rep.extend_from_slice(user_key);
        put_fixed64(&mut rep, pack_sequence_and_type(sequence, value_type));
        Self { rep }
    }

    /// Wrap already-encoded bytes
    pub fn from_encoded(rep: Vec<u8>) -> Self {
        Self { rep }
    }

    pub fn encoded(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn parse(&self) -> Option<ParsedInternalKey<'_>> {
        parse_internal_key(&self.rep)
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_internal_keys(&self.rep, &other.rep)
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Seek target for "newest entry of `user_key` visible at `sequence`"
#[derive(Debug, Clone)]
pub struct LookupKey {
    key: InternalKey,
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        Self {
            key: InternalKey::new(user_key, sequence, ValueType::FOR_SEEK),
        }
    }

    pub fn internal_key(&self) -> &[u8] {
        self.key.encoded()
    }

    pub fn user_key(&self) -> &[u8] {
        self.key.user_key()
    }
}

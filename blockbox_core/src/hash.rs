//! Weak polynomial content hashing for block deduplication.
//!
//! The hash is `acc = (acc * 31 + byte) mod 1_000_000_007` folded over every
//! byte of a block, rendered as the key `blk<acc>`. It is order-sensitive and
//! deterministic but makes no attempt at collision resistance: the block store
//! compares full block bytes before it treats two blocks as identical.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Multiplier of the polynomial accumulation.
pub const HASH_BASE: u64 = 31;

/// Modulus of the polynomial accumulation (a large prime).
pub const HASH_MODULUS: u64 = 1_000_000_007;

/// Textual prefix of every rendered hash key.
pub const KEY_PREFIX: &str = "blk";

/// A content hash over one block of bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(u64);

impl BlockHash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let acc = data
            .iter()
            .fold(0u64, |acc, &b| (acc * HASH_BASE + b as u64) % HASH_MODULUS);
        BlockHash(acc)
    }

    /// The accumulated value, always below [`HASH_MODULUS`].
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Render as the persisted key (e.g. `blk3105`).
    pub fn to_key(&self) -> String {
        format!("{}{}", KEY_PREFIX, self.0)
    }

    /// Parse a persisted key.
    pub fn parse(key: &str) -> Result<Self> {
        let digits = key
            .strip_prefix(KEY_PREFIX)
            .ok_or_else(|| Error::invalid_hash(format!("Hash key lacks prefix: {key}")))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_hash(format!(
                "Hash key is not numeric: {key}"
            )));
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| Error::invalid_hash(format!("Hash key overflows: {key}")))?;

        if value >= HASH_MODULUS {
            return Err(Error::invalid_hash(format!(
                "Hash key out of range: {key}"
            )));
        }

        Ok(BlockHash(value))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", KEY_PREFIX, self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_key())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}

//! Binary container format primitives.
//!
//! A container is one blob of little-endian `int32` fields and raw bytes:
//!
//! ```text
//! int32          block_size
//! int32          block_count
//! repeat block_count:
//!     int32      hash_len
//!     utf8       hash            ("blk<n>")
//!     int32      data_len
//!     bytes      data
//!     int32      ref_count
//! int32          entry_count
//! repeat entry_count:
//!     int32      path_len
//!     utf8       path
//!     int32      block_ref_count
//!     repeat block_ref_count:
//!         int32  block_id        (position in the block list above)
//! ```
//!
//! Decoding is strict: any truncation, negative length or count, invalid UTF-8,
//! or trailing garbage is reported as a corrupt container.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Size of one encoded `int32` field.
pub const INT_SIZE: usize = 4;

/// Append-only encoder for container fields.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an `int32` (little-endian).
    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length or count, rejecting values that do not fit an `int32`.
    pub fn put_len(&mut self, len: usize) -> Result<()> {
        let value = i32::try_from(len).map_err(|_| {
            Error::invalid_configuration(format!("Length {} exceeds the int32 format limit", len))
        })?;
        self.put_i32(value);
        Ok(())
    }

    /// Write a length-prefixed byte run.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, value: &str) -> Result<()> {
        self.put_bytes(value.as_bytes())
    }

    /// Finish encoding and return the blob.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Strict cursor over an encoded container.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    origin: PathBuf,
}

impl<'a> Decoder<'a> {
    /// Create a decoder; `origin` names the blob in error messages.
    pub fn new(buf: &'a [u8], origin: impl AsRef<Path>) -> Self {
        Self {
            buf,
            pos: 0,
            origin: origin.as_ref().to_path_buf(),
        }
    }

    /// Build a corrupt-container error at the current offset.
    pub fn corrupt(&self, reason: impl AsRef<str>) -> Error {
        Error::corrupt(
            &self.origin,
            format!("{} (at offset {})", reason.as_ref(), self.pos),
        )
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.corrupt(format!(
                "Truncated {}: need {} bytes, {} left",
                what,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read an `int32` (little-endian).
    pub fn i32(&mut self, what: &str) -> Result<i32> {
        let bytes = self.take(INT_SIZE, what)?;
        let mut raw = [0u8; INT_SIZE];
        raw.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(raw))
    }

    /// Read a non-negative `int32` length or count.
    pub fn length(&mut self, what: &str) -> Result<usize> {
        let value = self.i32(what)?;
        usize::try_from(value).map_err(|_| self.corrupt(format!("Negative {}: {}", what, value)))
    }

    /// Read a count of records that each occupy at least `min_record` bytes.
    ///
    /// Rejects counts the remaining input cannot possibly hold, so a corrupt
    /// count never drives a huge allocation.
    pub fn count(&mut self, what: &str, min_record: usize) -> Result<usize> {
        let count = self.length(what)?;
        if count.saturating_mul(min_record) > self.remaining() {
            return Err(self.corrupt(format!(
                "{} of {} exceeds remaining {} bytes",
                what,
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }

    /// Read a length-prefixed byte run.
    pub fn bytes(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.length(what)?;
        self.take(len, what)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn string(&mut self, what: &str) -> Result<String> {
        let bytes = self.bytes(what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| self.corrupt(format!("Invalid UTF-8 in {}: {}", what, e)))
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(self.corrupt(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }
}

//! File entries: a stored path and the ordered blocks composing its bytes.

use crate::block::{BlockId, DenseIds};
use crate::error::{Error, Result};
use crate::format::{Decoder, Encoder};

/// Minimum encoded size of one file entry (path length + block count).
pub(crate) const MIN_ENTRY_RECORD: usize = 8;

/// One logical file inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: String,
    blocks: Vec<BlockId>,
}

impl FileEntry {
    /// Create an entry with no blocks yet.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            blocks: Vec::new(),
        }
    }

    /// Full container path of the file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Block references in file order.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Append the next block of the file.
    pub fn push(&mut self, id: BlockId) {
        self.blocks.push(id);
    }

    /// Encode path and block references, translating ids to on-disk positions.
    pub fn encode(&self, enc: &mut Encoder, dense: &DenseIds) -> Result<()> {
        enc.put_str(&self.path)?;
        enc.put_len(self.blocks.len())?;
        for &id in &self.blocks {
            let position = dense.position(id).ok_or_else(|| Error::block_not_found(id))?;
            enc.put_i32(position as i32);
        }
        Ok(())
    }

    /// Decode an entry; `ids` maps on-disk positions to loaded block ids.
    pub fn decode(dec: &mut Decoder<'_>, ids: &[BlockId]) -> Result<Self> {
        let path = dec.string("file path")?;
        let count = dec.count("block reference count", 4)?;

        let mut entry = FileEntry::new(path);
        entry.blocks.reserve(count);
        for _ in 0..count {
            let position = dec.i32("block reference")?;
            let id = usize::try_from(position)
                .ok()
                .and_then(|p| ids.get(p))
                .ok_or_else(|| {
                    dec.corrupt(format!(
                        "File {} references block {} of {}",
                        entry.path,
                        position,
                        ids.len()
                    ))
                })?;
            entry.push(*id);
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockStore;

    #[test]
    fn test_encode_decode_entry() {
        let mut store = BlockStore::new();
        let a = store.add_block(b"a");
        let b = store.add_block(b"b");

        let mut entry = FileEntry::new("\\dir\\f.bin");
        entry.push(b);
        entry.push(a);
        entry.push(b);

        let mut enc = Encoder::new();
        entry.encode(&mut enc, &store.dense_ids()).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes, "mem");
        let decoded = FileEntry::decode(&mut dec, &[a, b]).unwrap();
        dec.finish().unwrap();

        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_encode_missing_block_fails() {
        let mut store = BlockStore::new();
        let a = store.add_block(b"a");
        let mut entry = FileEntry::new("\\f");
        entry.push(a);
        store.decrement_ref(a);

        let mut enc = Encoder::new();
        let err = entry.encode(&mut enc, &store.dense_ids()).unwrap_err();
        assert!(matches!(err, Error::BlockNotFound { .. }));
    }

    #[test]
    fn test_decode_out_of_range_reference() {
        let mut enc = Encoder::new();
        enc.put_str("\\f").unwrap();
        enc.put_i32(1);
        enc.put_i32(3);
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes, "mem");
        let err = FileEntry::decode(&mut dec, &[]).unwrap_err();
        assert!(matches!(err, Error::CorruptContainer { .. }));
    }

    #[test]
    fn test_decode_negative_reference() {
        let mut store = BlockStore::new();
        let a = store.add_block(b"a");

        let mut enc = Encoder::new();
        enc.put_str("\\f").unwrap();
        enc.put_i32(1);
        enc.put_i32(-1);
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes, "mem");
        assert!(FileEntry::decode(&mut dec, &[a]).is_err());
    }
}

//! Reference-counted, deduplicated block storage.
//!
//! Blocks live in an arena of slots. A [`BlockId`] names a slot together with
//! the generation the slot had when the block was stored, so an id keeps
//! pointing at the same block no matter which other blocks are removed, and a
//! stale id never resolves to a block that later reused its slot.
//!
//! Deduplication is verified: a block is shared only when both its hash and its
//! bytes match. Two different blocks whose hashes collide are stored side by
//! side under the same hash key.

use crate::error::{Error, Result};
use crate::format::{Decoder, Encoder};
use crate::hash::BlockHash;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Minimum encoded size of one block record (three `int32` fields).
const MIN_BLOCK_RECORD: usize = 12;

/// Stable handle to a block in a [`BlockStore`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    slot: u32,
    generation: u32,
}

impl BlockId {
    /// Arena slot the block occupies.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when the block was stored.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self)
    }
}

/// One unique block of data and the number of file references to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    hash: BlockHash,
    data: Vec<u8>,
    ref_count: u32,
}

impl Block {
    /// Content hash of the block.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Raw block bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of file references held on this block.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Length of the block data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    block: Option<Block>,
}

/// Mapping from live block ids to their on-disk positions.
///
/// Positions are dense (`0..block_count`) in slot order, which is the order
/// blocks are written by [`BlockStore::encode`].
#[derive(Debug)]
pub struct DenseIds {
    by_slot: Vec<Option<(u32, u32)>>,
}

impl DenseIds {
    /// On-disk position of `id`, if it names a live block.
    pub fn position(&self, id: BlockId) -> Option<u32> {
        match self.by_slot.get(id.slot as usize) {
            Some(Some((generation, position))) if *generation == id.generation => Some(*position),
            _ => None,
        }
    }
}

/// The set of unique blocks shared by every file in a container.
#[derive(Debug, Clone, Default)]
pub struct BlockStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_hash: HashMap<BlockHash, Vec<u32>>,
    live: usize,
}

impl BlockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk of data, sharing an identical existing block when there is one.
    ///
    /// Returns the id of the block now holding one more reference.
    pub fn add_block(&mut self, data: &[u8]) -> BlockId {
        let hash = BlockHash::of(data);

        if let Some(id) = self.find_identical(hash, data) {
            let slot = &mut self.slots[id.slot as usize];
            if let Some(block) = slot.block.as_mut() {
                block.ref_count += 1;
                trace!(%hash, %id, refs = block.ref_count, "shared existing block");
            }
            return id;
        }

        let block = Block {
            hash,
            data: data.to_vec(),
            ref_count: 1,
        };
        let id = self.insert(block);
        trace!(%hash, %id, len = data.len(), "stored new block");
        id
    }

    /// Drop one reference to a block, removing it once no references remain.
    ///
    /// Unknown or stale ids are ignored. Returns `true` if the block was removed.
    pub fn decrement_ref(&mut self, id: BlockId) -> bool {
        let Some(slot) = self.slots.get_mut(id.slot as usize) else {
            return false;
        };
        if slot.generation != id.generation {
            return false;
        }
        let Some(block) = slot.block.as_mut() else {
            return false;
        };

        block.ref_count = block.ref_count.saturating_sub(1);
        if block.ref_count > 0 {
            return false;
        }

        let hash = block.hash;
        slot.block = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.live -= 1;

        if let Some(slots) = self.by_hash.get_mut(&hash) {
            slots.retain(|s| *s != id.slot);
            if slots.is_empty() {
                self.by_hash.remove(&hash);
            }
        }

        trace!(%hash, %id, "released block");
        true
    }

    /// Look up a live block.
    pub fn get_block(&self, id: BlockId) -> Option<&Block> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.block.as_ref())
    }

    /// Look up a live block, failing with `BlockNotFound`.
    pub fn resolve(&self, id: BlockId) -> Result<&Block> {
        self.get_block(id).ok_or_else(|| Error::block_not_found(id))
    }

    /// Ids of every live block whose hash equals `hash`.
    pub fn find_by_hash(&self, hash: BlockHash) -> Vec<BlockId> {
        self.by_hash
            .get(&hash)
            .map(|slots| slots.iter().map(|&s| self.id_for(s)).collect())
            .unwrap_or_default()
    }

    /// Iterate live blocks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.slots.iter().enumerate().filter_map(|(slot, s)| {
            s.block.as_ref().map(|block| {
                (
                    BlockId {
                        slot: slot as u32,
                        generation: s.generation,
                    },
                    block,
                )
            })
        })
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total bytes of block data held (each unique block counted once).
    pub fn stored_bytes(&self) -> u64 {
        self.iter().map(|(_, block)| block.len() as u64).sum()
    }

    /// Dense on-disk positions for the current live blocks.
    pub fn dense_ids(&self) -> DenseIds {
        let mut next = 0u32;
        let by_slot = self
            .slots
            .iter()
            .map(|s| {
                s.block.as_ref().map(|_| {
                    let position = next;
                    next += 1;
                    (s.generation, position)
                })
            })
            .collect();
        DenseIds { by_slot }
    }

    /// Encode the block list: count, then hash/data/refcount per block.
    ///
    /// Returns the on-disk position of every encoded block.
    pub fn encode(&self, enc: &mut Encoder) -> Result<DenseIds> {
        self.encode_releasing(enc, &HashMap::new())
    }

    /// Encode the block list as it would be after dropping `released`
    /// references per block, without touching the store.
    ///
    /// Blocks left with no references are omitted.
    pub fn encode_releasing(
        &self,
        enc: &mut Encoder,
        released: &HashMap<BlockId, u32>,
    ) -> Result<DenseIds> {
        let survivors: Vec<(BlockId, &Block, u32)> = self
            .iter()
            .filter_map(|(id, block)| {
                let dropped = released.get(&id).copied().unwrap_or(0);
                let refs = block.ref_count.saturating_sub(dropped);
                (refs > 0).then_some((id, block, refs))
            })
            .collect();

        let mut by_slot = vec![None; self.slots.len()];
        enc.put_len(survivors.len())?;
        for (position, (id, block, refs)) in survivors.into_iter().enumerate() {
            enc.put_str(&block.hash.to_key())?;
            enc.put_bytes(&block.data)?;
            let refs = i32::try_from(refs).map_err(|_| {
                Error::invalid_configuration(format!(
                    "Reference count {} exceeds the int32 format limit",
                    refs
                ))
            })?;
            enc.put_i32(refs);
            by_slot[id.slot as usize] = Some((id.generation, position as u32));
        }
        Ok(DenseIds { by_slot })
    }

    /// Decode a block list written by [`BlockStore::encode`].
    ///
    /// Returns the store and the id assigned to each on-disk position.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<(Self, Vec<BlockId>)> {
        let count = dec.count("block count", MIN_BLOCK_RECORD)?;
        let mut store = BlockStore::new();
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let key = dec.string("block hash")?;
            let hash = BlockHash::parse(&key).map_err(|e| dec.corrupt(e.to_string()))?;
            let data = dec.bytes("block data")?.to_vec();
            let ref_count = dec.i32("reference count")?;
            if ref_count < 1 {
                return Err(dec.corrupt(format!(
                    "Block {} has reference count {}",
                    key, ref_count
                )));
            }

            ids.push(store.insert(Block {
                hash,
                data,
                ref_count: ref_count as u32,
            }));
        }

        Ok((store, ids))
    }

    fn find_identical(&self, hash: BlockHash, data: &[u8]) -> Option<BlockId> {
        let slots = self.by_hash.get(&hash)?;
        slots
            .iter()
            .copied()
            .find(|&s| {
                self.slots[s as usize]
                    .block
                    .as_ref()
                    .is_some_and(|block| block.data == data)
            })
            .map(|s| self.id_for(s))
    }

    fn id_for(&self, slot: u32) -> BlockId {
        BlockId {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn insert(&mut self, block: Block) -> BlockId {
        let hash = block.hash;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize].block = Some(block);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    block: Some(block),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.by_hash.entry(hash).or_default().push(slot);
        self.live += 1;
        self.id_for(slot)
    }
}

//! Container statistics and consistency checking.

use crate::container::Container;
use crate::hash::BlockHash;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Space accounting for a container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStats {
    /// Block size fixed at creation.
    pub block_size: u32,
    /// Number of stored files.
    pub files: usize,
    /// Number of unique blocks.
    pub blocks: usize,
    /// Sum of all file sizes.
    pub logical_bytes: u64,
    /// Sum of unique block sizes.
    pub stored_bytes: u64,
    /// `logical_bytes / stored_bytes`, or 1.0 for an empty container.
    pub dedup_ratio: f64,
}

/// A single inconsistency found by [`Container::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// A block's stored hash does not match its data.
    HashMismatch {
        stored: BlockHash,
        computed: BlockHash,
    },
    /// A block's reference count disagrees with the references held by files.
    RefCountMismatch {
        hash: BlockHash,
        stored: u32,
        referenced: u32,
    },
    /// A file references a block that is not in the store.
    DanglingReference { path: String, index: usize },
    /// A block is larger than the container block size.
    OversizedBlock { hash: BlockHash, len: usize },
}

/// Result of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Number of blocks examined.
    pub blocks_checked: usize,
    /// Number of files examined.
    pub files_checked: usize,
    /// Every inconsistency found.
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    /// True if no problems were found.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

impl Container {
    /// Compute space accounting.
    pub fn stats(&self) -> ContainerStats {
        let logical_bytes: u64 = self
            .entries()
            .iter()
            .filter_map(|e| self.size_of(e.path()))
            .sum();
        let stored_bytes = self.store().stored_bytes();

        let dedup_ratio = if stored_bytes == 0 {
            1.0
        } else {
            logical_bytes as f64 / stored_bytes as f64
        };

        ContainerStats {
            block_size: self.block_size(),
            files: self.len(),
            blocks: self.store().len(),
            logical_bytes,
            stored_bytes,
            dedup_ratio,
        }
    }

    /// Check block hashes, reference counts, and file references.
    ///
    /// Read-only: problems are reported, never repaired.
    pub fn verify(&self) -> VerifyReport {
        let mut report = VerifyReport::default();
        let mut referenced = HashMap::new();

        for entry in self.entries() {
            report.files_checked += 1;
            for (index, &id) in entry.blocks().iter().enumerate() {
                if self.store().get_block(id).is_some() {
                    *referenced.entry(id).or_insert(0u32) += 1;
                } else {
                    report.problems.push(Problem::DanglingReference {
                        path: entry.path().to_string(),
                        index,
                    });
                }
            }
        }

        for (id, block) in self.store().iter() {
            report.blocks_checked += 1;

            let computed = BlockHash::of(block.data());
            if computed != block.hash() {
                report.problems.push(Problem::HashMismatch {
                    stored: block.hash(),
                    computed,
                });
            }

            let count = referenced.get(&id).copied().unwrap_or(0);
            if count != block.ref_count() {
                report.problems.push(Problem::RefCountMismatch {
                    hash: block.hash(),
                    stored: block.ref_count(),
                    referenced: count,
                });
            }

            if block.len() > self.block_size() as usize {
                report.problems.push(Problem::OversizedBlock {
                    hash: block.hash(),
                    len: block.len(),
                });
            }
        }

        if !report.is_ok() {
            warn!(
                path = %self.path().display(),
                problems = report.problems.len(),
                "container failed verification"
            );
        }
        report
    }
}

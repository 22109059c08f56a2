//! # Blockbox Core
//!
//! A single-file container that stores many files with block-level
//! deduplication.
//!
//! Files are split into fixed-size blocks. Each unique block is stored once
//! and reference counted; a file is an ordered list of block references. The
//! whole container is one binary blob that is rewritten atomically after every
//! change. File names carry `\`-separated directory paths, from which a
//! navigable directory tree is projected.
//!
//! ## Features
//!
//! - Fixed-size chunking with verified deduplication
//! - Reference-counted block store with stable, generation-tagged ids
//! - Strict binary decoding that rejects corrupt containers
//! - Directory projection with shell-style navigation
//! - Consistency checking and space accounting
//!
//! ## Example
//!
//! ```no_run
//! use blockbox_core::{Container, ContainerConfig, Session};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open the container, creating it if needed
//! let container = Container::open_or_create("./container.bin", ContainerConfig::default())?;
//! let mut session = Session::new(container);
//!
//! // Store a file under a directory
//! session.make_dir("docs")?;
//! session.change_dir("docs")?;
//! session.copy_in(Path::new("./notes.txt"), "notes.txt")?;
//!
//! // Inspect and copy it back out
//! for file in session.list().files {
//!     println!("{} {:?}", file.name, file.size);
//! }
//! session.copy_out("notes.txt", Path::new("./restored.txt"))?;
//!
//! let stats = session.container().stats();
//! println!("dedup ratio {:.2}", stats.dedup_ratio);
//! # Ok(())
//! # }
//! ```

mod block;
mod check;
mod config;
mod container;
mod entry;
mod error;
pub mod format;
mod hash;
pub mod path;
mod session;
mod tree;

pub use block::{Block, BlockId, BlockStore, DenseIds};
pub use check::{ContainerStats, Problem, VerifyReport};
pub use config::{ContainerConfig, DEFAULT_BLOCK_SIZE};
pub use container::Container;
pub use entry::FileEntry;
pub use error::{Error, Result};
pub use hash::{BlockHash, HASH_BASE, HASH_MODULUS, KEY_PREFIX};
pub use path::{join_path, split_path};
pub use session::{ImportStats, ListedFile, Listing, Session};
pub use tree::{DirTree, NodeId};

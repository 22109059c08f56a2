//! Container management: chunking, reassembly, and whole-blob persistence.

use crate::block::{BlockId, BlockStore};
use crate::config::ContainerConfig;
use crate::entry::{FileEntry, MIN_ENTRY_RECORD};
use crate::error::{Error, Result};
use crate::format::{Decoder, Encoder};
use crate::path::validate_full_path;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A single-file container of deduplicated files.
///
/// Every mutation rewrites the whole container blob through a temporary file
/// that is atomically renamed over the previous one, so the file on disk is
/// always the last complete write. A mutation whose rewrite fails leaves the
/// in-memory state as it was.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    block_size: u32,
    store: BlockStore,
    entries: Vec<FileEntry>,
}

impl Container {
    /// Create a new, empty container file at `path`.
    ///
    /// Fails with `AlreadyExists` if something is already at `path`.
    pub fn create<P: AsRef<Path>>(path: P, config: ContainerConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            return Err(Error::already_exists(path.display().to_string()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let container = Self {
            path,
            block_size: config.block_size,
            store: BlockStore::new(),
            entries: Vec::new(),
        };
        container.persist()?;

        info!(
            path = %container.path.display(),
            block_size = container.block_size,
            "created container"
        );
        Ok(container)
    }

    /// Open an existing container file.
    ///
    /// Any format error aborts the load with `CorruptContainer`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.is_file() {
            return Err(Error::not_found(path.display().to_string()));
        }

        let bytes = fs::read(&path)?;
        let container = Self::decode(&bytes, path)?;

        debug!(
            path = %container.path.display(),
            files = container.entries.len(),
            blocks = container.store.len(),
            "opened container"
        );
        Ok(container)
    }

    /// Open the container at `path`, creating it with `config` if it is missing.
    ///
    /// An existing container keeps the block size stored in its header.
    pub fn open_or_create<P: AsRef<Path>>(path: P, config: ContainerConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::create(path, config);
        }

        let container = Self::open(path)?;
        if container.block_size != config.block_size {
            warn!(
                stored = container.block_size,
                requested = config.block_size,
                "container block size is fixed at creation; using stored value"
            );
        }
        Ok(container)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block size fixed at creation.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// The shared block store.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// All file entries in insertion order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Look up a file entry by full path.
    pub fn entry(&self, full_path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.path() == full_path)
    }

    /// True if a file is stored at `full_path`.
    pub fn contains(&self, full_path: &str) -> bool {
        self.entry(full_path).is_some()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `data` as a new file at `full_path` and rewrite the container.
    ///
    /// Duplicate paths are rejected with `AlreadyExists`.
    pub fn ingest(&mut self, data: &[u8], full_path: &str) -> Result<()> {
        self.stage_ingest(data, full_path)?;
        if let Err(err) = self.persist() {
            self.unstage(1);
            return Err(err);
        }

        debug!(
            path = full_path,
            bytes = data.len(),
            block_size = self.block_size,
            "stored file"
        );
        Ok(())
    }

    /// Read a host file and store it at `full_path`.
    pub fn ingest_file(&mut self, source: &Path, full_path: &str) -> Result<()> {
        if !source.is_file() {
            return Err(Error::source_unavailable(source));
        }
        let data = fs::read(source)?;
        self.ingest(&data, full_path)
    }

    /// Chunk `data` into blocks and record the entry without rewriting the blob.
    pub(crate) fn stage_ingest(&mut self, data: &[u8], full_path: &str) -> Result<()> {
        validate_full_path(full_path)?;
        if self.contains(full_path) {
            return Err(Error::already_exists(full_path));
        }

        let mut entry = FileEntry::new(full_path);
        for chunk in data.chunks(self.block_size as usize) {
            entry.push(self.store.add_block(chunk));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Drop the last `count` staged entries and the references they took.
    pub(crate) fn unstage(&mut self, count: usize) {
        for _ in 0..count {
            let Some(last) = self.entries.len().checked_sub(1) else {
                break;
            };
            self.release(last);
        }
    }

    /// Write the bytes of the file at `full_path` to `sink`, block by block.
    ///
    /// Returns the number of bytes written.
    pub fn extract<W: Write>(&self, full_path: &str, mut sink: W) -> Result<u64> {
        let entry = self
            .entry(full_path)
            .ok_or_else(|| Error::not_found(full_path))?;

        let mut written = 0u64;
        for &id in entry.blocks() {
            let block = self.store.resolve(id)?;
            sink.write_all(block.data())?;
            written += block.len() as u64;
        }
        sink.flush()?;
        Ok(written)
    }

    /// Read the whole file at `full_path` into memory.
    pub fn read(&self, full_path: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.extract(full_path, &mut buf)?;
        Ok(buf)
    }

    /// Copy the file at `full_path` to a host file at `dest`.
    ///
    /// `dest` is only created once the file is known to exist.
    pub fn extract_to_file(&self, full_path: &str, dest: &Path) -> Result<u64> {
        if !self.contains(full_path) {
            return Err(Error::not_found(full_path));
        }
        let file = fs::File::create(dest)?;
        let written = self.extract(full_path, BufWriter::new(file))?;

        debug!(path = full_path, dest = %dest.display(), bytes = written, "extracted file");
        Ok(written)
    }

    /// Remove the file at `full_path`, releasing its blocks, and rewrite the container.
    pub fn remove(&mut self, full_path: &str) -> Result<()> {
        let index = self
            .position(full_path)
            .ok_or_else(|| Error::not_found(full_path))?;
        self.write_blob(&self.encode_excluding(&BTreeSet::from([index]))?)?;
        let released = self.release(index);

        debug!(path = full_path, released, "removed file");
        Ok(())
    }

    /// Remove several files with a single rewrite.
    ///
    /// Paths that are not stored are skipped. Returns how many files were removed.
    pub fn remove_many<I, S>(&mut self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut doomed = BTreeSet::new();
        for path in paths {
            let path = path.as_ref();
            match self.position(path) {
                Some(index) => {
                    doomed.insert(index);
                }
                None => warn!(path, "skipping removal of missing file"),
            }
        }

        if !doomed.is_empty() {
            self.write_blob(&self.encode_excluding(&doomed)?)?;
            // Highest index first so the remaining indices stay valid
            for &index in doomed.iter().rev() {
                self.release(index);
            }
        }
        debug!(removed = doomed.len(), "removed files");
        Ok(doomed.len())
    }

    /// Logical size of the file at `full_path`, or `None` if it is not stored.
    pub fn size_of(&self, full_path: &str) -> Option<u64> {
        let entry = self.entry(full_path)?;
        Some(
            entry
                .blocks()
                .iter()
                .filter_map(|&id| self.store.get_block(id))
                .map(|block| block.len() as u64)
                .sum(),
        )
    }

    /// Rewrite the whole container atomically from in-memory state.
    pub fn persist(&self) -> Result<()> {
        self.write_blob(&self.encode()?)
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(bytes)?;
        temp_file.flush()?;
        temp_file.persist(&self.path)?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "persisted container");
        Ok(())
    }

    /// Serialize the container to its binary layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_excluding(&BTreeSet::new())
    }

    /// Serialize the container as it would be without the entries at `skipped`.
    fn encode_excluding(&self, skipped: &BTreeSet<usize>) -> Result<Vec<u8>> {
        let mut released: HashMap<BlockId, u32> = HashMap::new();
        let kept: Vec<&FileEntry> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                if skipped.contains(&index) {
                    for &id in entry.blocks() {
                        *released.entry(id).or_insert(0) += 1;
                    }
                    None
                } else {
                    Some(entry)
                }
            })
            .collect();

        let mut enc = Encoder::new();
        enc.put_i32(self.block_size as i32);
        let dense = self.store.encode_releasing(&mut enc, &released)?;
        enc.put_len(kept.len())?;
        for entry in kept {
            entry.encode(&mut enc, &dense)?;
        }
        Ok(enc.into_bytes())
    }

    /// Deserialize a container blob; `path` becomes its backing file.
    pub fn decode(bytes: &[u8], path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut dec = Decoder::new(bytes, &path);

        let block_size = dec.i32("block size")?;
        if block_size <= 0 {
            return Err(dec.corrupt(format!("Non-positive block size {}", block_size)));
        }

        let (store, ids) = BlockStore::decode(&mut dec)?;

        let count = dec.count("file entry count", MIN_ENTRY_RECORD)?;
        let mut entries: Vec<FileEntry> = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = FileEntry::decode(&mut dec, &ids)?;
            if let Err(err) = validate_full_path(entry.path()) {
                return Err(dec.corrupt(format!("Bad file path {:?}: {}", entry.path(), err)));
            }
            if entries.iter().any(|e| e.path() == entry.path()) {
                return Err(dec.corrupt(format!("Duplicate file path {}", entry.path())));
            }
            entries.push(entry);
        }
        dec.finish()?;

        Ok(Self {
            path,
            block_size: block_size as u32,
            store,
            entries,
        })
    }

    fn position(&self, full_path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path() == full_path)
    }

    /// Drop the entry at `index` and one reference per block it holds.
    ///
    /// Returns the number of blocks that were freed.
    fn release(&mut self, index: usize) -> usize {
        let entry = self.entries.remove(index);
        entry
            .blocks()
            .iter()
            .filter(|&&id| self.store.decrement_ref(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_container(temp_dir: &TempDir, block_size: u32) -> Container {
        Container::create(
            temp_dir.path().join("container.bin"),
            ContainerConfig::with_block_size(block_size),
        )
        .unwrap()
    }

    #[test]
    fn test_create_writes_empty_container() {
        let temp_dir = TempDir::new().unwrap();
        let container = new_container(&temp_dir, 8);

        let bytes = fs::read(container.path()).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&8i32.to_le_bytes());
        expected.extend_from_slice(&0i32.to_le_bytes());
        expected.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_create_existing_fails() {
        let temp_dir = TempDir::new().unwrap();
        new_container(&temp_dir, 8);
        let result = Container::create(
            temp_dir.path().join("container.bin"),
            ContainerConfig::default(),
        );
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));
    }

    #[test]
    fn test_create_invalid_block_size() {
        let temp_dir = TempDir::new().unwrap();
        let result = Container::create(
            temp_dir.path().join("c.bin"),
            ContainerConfig::with_block_size(0),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
        assert!(!temp_dir.path().join("c.bin").exists());
    }

    #[test]
    fn test_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result = Container::open(temp_dir.path().join("missing.bin"));
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_ingest_extract_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        let data = b"hello block world";
        container.ingest(data, "\\hello.txt").unwrap();

        let mut out = Vec::new();
        let written = container.extract("\\hello.txt", &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(written, data.len() as u64);
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        container.ingest(b"", "\\empty").unwrap();
        assert_eq!(container.entry("\\empty").unwrap().blocks().len(), 0);
        assert_eq!(container.read("\\empty").unwrap(), b"");
        assert_eq!(container.size_of("\\empty"), Some(0));
    }

    #[test]
    fn test_chunk_boundaries() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        container.ingest(b"abcdefgh", "\\exact").unwrap();
        container.ingest(b"abcdefghij", "\\partial").unwrap();

        assert_eq!(container.entry("\\exact").unwrap().blocks().len(), 2);

        let partial = container.entry("\\partial").unwrap();
        assert_eq!(partial.blocks().len(), 3);
        let last = container.store().get_block(partial.blocks()[2]).unwrap();
        assert_eq!(last.data(), b"ij");
    }

    #[test]
    fn test_deduplication_across_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        let data = b"AAAABBBBAAAA";
        container.ingest(data, "\\one").unwrap();
        container.ingest(data, "\\two").unwrap();

        // Two distinct chunks: "AAAA" and "BBBB"
        assert_eq!(container.store().len(), 2);
        assert_eq!(container.store().stored_bytes(), 8);

        let one = container.entry("\\one").unwrap();
        let two = container.entry("\\two").unwrap();
        assert_eq!(one.blocks(), two.blocks());
        assert_eq!(one.blocks()[0], one.blocks()[2]);

        let aaaa = container.store().get_block(one.blocks()[0]).unwrap();
        assert_eq!(aaaa.ref_count(), 4);
    }

    #[test]
    fn test_remove_decrements_refcount() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        container.ingest(b"SHAR", "\\a").unwrap();
        container.ingest(b"SHAR", "\\b").unwrap();
        let id = container.entry("\\a").unwrap().blocks()[0];
        assert_eq!(container.store().get_block(id).unwrap().ref_count(), 2);

        container.remove("\\a").unwrap();
        assert_eq!(container.store().get_block(id).unwrap().ref_count(), 1);
        assert_eq!(container.read("\\b").unwrap(), b"SHAR");

        container.remove("\\b").unwrap();
        assert!(container.store().get_block(id).is_none());
        assert!(container.store().resolve(id).is_err());
        assert!(container.store().is_empty());
    }

    #[test]
    fn test_remove_keeps_other_files_intact() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 2);

        container.ingest(b"aabb", "\\first").unwrap();
        container.ingest(b"ccdd", "\\second").unwrap();
        container.ingest(b"eeaa", "\\third").unwrap();

        container.remove("\\first").unwrap();
        assert_eq!(container.read("\\second").unwrap(), b"ccdd");
        assert_eq!(container.read("\\third").unwrap(), b"eeaa");

        let reopened = Container::open(container.path()).unwrap();
        assert_eq!(reopened.read("\\second").unwrap(), b"ccdd");
        assert_eq!(reopened.read("\\third").unwrap(), b"eeaa");
        assert_eq!(reopened.store().len(), 4);
    }

    #[test]
    fn test_remove_missing_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        let result = container.remove("\\nope");
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_remove_many_single_pass() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        container.ingest(b"1111", "\\d\\a").unwrap();
        container.ingest(b"2222", "\\d\\b").unwrap();
        container.ingest(b"3333", "\\keep").unwrap();

        let removed = container
            .remove_many(["\\d\\a", "\\d\\b", "\\d\\missing"])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(container.len(), 1);
        assert_eq!(container.store().len(), 1);

        let reopened = Container::open(container.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains("\\keep"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        container.ingest(b"first", "\\f").unwrap();
        let result = container.ingest(b"second", "\\f");
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));

        // The rejected ingest leaves no trace
        assert_eq!(container.len(), 1);
        assert_eq!(container.read("\\f").unwrap(), b"first");
        assert_eq!(container.store().len(), 2);
    }

    #[test]
    fn test_invalid_path_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        assert!(matches!(
            container.ingest(b"x", "relative.txt"),
            Err(Error::InvalidName { .. })
        ));
        assert!(container.is_empty());
    }

    #[test]
    fn test_extract_missing() {
        let temp_dir = TempDir::new().unwrap();
        let container = new_container(&temp_dir, 4);
        let mut out = Vec::new();
        assert!(matches!(
            container.extract("\\missing", &mut out),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_extract_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 3);
        container.ingest(b"file contents", "\\f.txt").unwrap();

        let dest = temp_dir.path().join("out.txt");
        container.extract_to_file("\\f.txt", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"file contents");

        let missing_dest = temp_dir.path().join("never.txt");
        assert!(container.extract_to_file("\\nope", &missing_dest).is_err());
        assert!(!missing_dest.exists());
    }

    #[test]
    fn test_ingest_file_source_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        let result = container.ingest_file(&temp_dir.path().join("ghost.txt"), "\\ghost.txt");
        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    }

    #[test]
    fn test_ingest_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);

        let source = temp_dir.path().join("src.bin");
        fs::write(&source, b"from the host").unwrap();
        container.ingest_file(&source, "\\src.bin").unwrap();
        assert_eq!(container.read("\\src.bin").unwrap(), b"from the host");
    }

    #[test]
    fn test_size_of() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        container.ingest(b"0123456789", "\\ten").unwrap();
        assert_eq!(container.size_of("\\ten"), Some(10));
        assert_eq!(container.size_of("\\none"), None);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 3);
        container.ingest(b"abcabcab", "\\x").unwrap();
        container.ingest(b"", "\\dir\\empty").unwrap();
        container.ingest(b"zzzabc", "\\dir\\y").unwrap();

        let reopened = Container::open(container.path()).unwrap();
        assert_eq!(reopened.block_size(), 3);
        assert_eq!(reopened.entries().len(), 3);
        for entry in container.entries() {
            assert_eq!(
                reopened.read(entry.path()).unwrap(),
                container.read(entry.path()).unwrap()
            );
        }

        let original: Vec<_> = container.store().iter().map(|(_, b)| b.clone()).collect();
        let loaded: Vec<_> = reopened.store().iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(original, loaded);
        assert_eq!(reopened.encode().unwrap(), container.encode().unwrap());
    }

    #[test]
    fn test_open_or_create_keeps_stored_block_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.bin");

        let created = Container::open_or_create(&path, ContainerConfig::with_block_size(16)).unwrap();
        assert_eq!(created.block_size(), 16);

        let reopened = Container::open_or_create(&path, ContainerConfig::with_block_size(64)).unwrap();
        assert_eq!(reopened.block_size(), 16);
    }

    #[test]
    fn test_open_truncated_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        container.ingest(b"some bytes here", "\\f").unwrap();

        let bytes = fs::read(container.path()).unwrap();
        for cut in [2, 6, bytes.len() / 2, bytes.len() - 1] {
            let corrupt_path = temp_dir.path().join(format!("cut{}.bin", cut));
            fs::write(&corrupt_path, &bytes[..cut]).unwrap();
            let result = Container::open(&corrupt_path);
            assert!(
                matches!(result, Err(Error::CorruptContainer { .. })),
                "cut at {} should be corrupt",
                cut
            );
        }
    }

    #[test]
    fn test_open_trailing_bytes_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let container = new_container(&temp_dir, 4);
        let mut bytes = fs::read(container.path()).unwrap();
        bytes.push(0);
        assert!(matches!(
            Container::decode(&bytes, "mem"),
            Err(Error::CorruptContainer { .. })
        ));
    }

    #[test]
    fn test_decode_non_positive_block_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            Container::decode(&bytes, "mem"),
            Err(Error::CorruptContainer { .. })
        ));
    }

    #[test]
    fn test_decode_duplicate_paths_is_corrupt() {
        let mut enc = Encoder::new();
        enc.put_i32(4);
        enc.put_i32(0);
        enc.put_i32(2);
        for _ in 0..2 {
            enc.put_str("\\same").unwrap();
            enc.put_i32(0);
        }
        assert!(matches!(
            Container::decode(&enc.into_bytes(), "mem"),
            Err(Error::CorruptContainer { .. })
        ));
    }

    #[test]
    fn test_decode_non_canonical_paths_is_corrupt() {
        for path in ["\\D\\\\e.txt", "bare.txt", "\\dir\\", "\\a\\..\\b"] {
            let mut enc = Encoder::new();
            enc.put_i32(4);
            enc.put_i32(0);
            enc.put_i32(1);
            enc.put_str(path).unwrap();
            enc.put_i32(0);
            assert!(
                matches!(
                    Container::decode(&enc.into_bytes(), "mem"),
                    Err(Error::CorruptContainer { .. })
                ),
                "{:?} should be rejected",
                path
            );
        }
    }

    /// Replace the container file with a non-empty directory so rewrites fail.
    fn block_rewrites(path: &Path) {
        fs::remove_file(path).unwrap();
        fs::create_dir(path).unwrap();
        fs::write(path.join("occupied"), b"x").unwrap();
    }

    #[test]
    fn test_failed_rewrite_leaves_state_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        container.ingest(b"abcdefgh", "\\keep").unwrap();
        container.ingest(b"abcdwxyz", "\\other").unwrap();
        let before = container.encode().unwrap();

        let path = container.path().to_path_buf();
        block_rewrites(&path);

        assert!(container.ingest(b"abcdzzzz", "\\new").is_err());
        assert!(!container.contains("\\new"));
        assert_eq!(container.store().len(), 3);

        assert!(container.remove("\\keep").is_err());
        assert!(container.contains("\\keep"));
        assert!(container.remove_many(["\\keep", "\\other"]).is_err());
        assert_eq!(container.len(), 2);
        assert_eq!(container.encode().unwrap(), before);

        // Once the path is writable again, retrying succeeds
        fs::remove_dir_all(&path).unwrap();
        container.ingest(b"abcdzzzz", "\\new").unwrap();
        let reopened = Container::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert!(reopened.verify().is_ok());
    }

    #[test]
    fn test_remove_many_matches_sequential_removes() {
        let temp_dir = TempDir::new().unwrap();
        let mut batch = new_container(&temp_dir, 3);
        for (i, data) in [&b"aaabbbccc"[..], &b"bbbddd"[..], &b"aaaeee"[..]].iter().enumerate() {
            batch.ingest(data, &format!("\\f{}", i)).unwrap();
        }
        let mut single = Container::decode(&batch.encode().unwrap(), "mem").unwrap();

        assert_eq!(batch.remove_many(["\\f0", "\\f2", "\\f0"]).unwrap(), 2);
        single.release(0);
        single.release(1);

        assert_eq!(batch.encode().unwrap(), single.encode().unwrap());
        let reopened = Container::open(batch.path()).unwrap();
        assert_eq!(reopened.read("\\f1").unwrap(), b"bbbddd");
        assert_eq!(reopened.store().len(), 2);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let mut container = new_container(&temp_dir, 4);
        container.ingest(b"data", "\\a").unwrap();
        container.remove("\\a").unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("container.bin")]);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Extracted bytes always equal the ingested bytes
        #[test]
        fn prop_ingest_extract_roundtrip(
            block_size in 1u32..64,
            data in prop::collection::vec(any::<u8>(), 0..512)
        ) {
            let temp_dir = TempDir::new().unwrap();
            let mut container = new_container(&temp_dir, block_size);
            container.ingest(&data, "\\f")?;
            prop_assert_eq!(container.read("\\f")?, data);
        }

        /// A file of k full blocks plus r bytes yields k (+1 if r > 0) blocks
        #[test]
        fn prop_chunk_count(
            block_size in 1u32..32,
            k in 0usize..8,
            r in 0usize..32
        ) {
            let r = r % block_size as usize;
            let len = k * block_size as usize + r;
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            let temp_dir = TempDir::new().unwrap();
            let mut container = new_container(&temp_dir, block_size);
            container.ingest(&data, "\\f")?;

            let entry = container.entry("\\f").unwrap();
            let expected = if r > 0 { k + 1 } else { k };
            prop_assert_eq!(entry.blocks().len(), expected);
            if r > 0 {
                let last = container.store().get_block(*entry.blocks().last().unwrap()).unwrap();
                prop_assert_eq!(last.len(), r);
            }
        }

        /// Reopening reproduces identical files and blocks
        #[test]
        fn prop_persistence_roundtrip(
            block_size in 1u32..16,
            files in prop::collection::vec(prop::collection::vec(0u8..4, 0..64), 0..6)
        ) {
            let temp_dir = TempDir::new().unwrap();
            let mut container = new_container(&temp_dir, block_size);
            for (i, data) in files.iter().enumerate() {
                container.ingest(data, &format!("\\f{}", i))?;
            }

            let reopened = Container::open(container.path())?;
            prop_assert_eq!(reopened.len(), files.len());
            for (i, data) in files.iter().enumerate() {
                prop_assert_eq!(&reopened.read(&format!("\\f{}", i))?, data);
            }
            let before: Vec<_> = container.store().iter().map(|(_, b)| b.clone()).collect();
            let after: Vec<_> = reopened.store().iter().map(|(_, b)| b.clone()).collect();
            prop_assert_eq!(before, after);
        }
    }
}

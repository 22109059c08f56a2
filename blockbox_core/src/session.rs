//! Shell-style navigation over a container.
//!
//! A [`Session`] pairs a [`Container`] with the [`DirTree`] projected from its
//! stored paths and keeps the two in sync: file operations resolve names
//! against the current directory, and removing a directory removes every file
//! stored beneath it.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::path::{SEPARATOR, join_path, split_path, validate_name};
use crate::tree::{DirTree, NodeId};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A file shown by [`Session::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedFile {
    pub name: String,
    /// Logical size in bytes, `None` if the container has no such entry.
    pub size: Option<u64>,
}

/// Contents of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub path: String,
    pub dirs: Vec<String>,
    pub files: Vec<ListedFile>,
}

/// Counts from [`Session::import_dir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub files: usize,
    pub bytes: u64,
}

/// A container plus its directory projection and working directory.
#[derive(Debug)]
pub struct Session {
    container: Container,
    tree: DirTree,
}

impl Session {
    /// Project the directory tree from every stored path.
    pub fn new(container: Container) -> Self {
        let tree = DirTree::from_paths(container.entries().iter().map(|e| e.path()));
        Self { container, tree }
    }

    /// The underlying container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The directory projection.
    pub fn tree(&self) -> &DirTree {
        &self.tree
    }

    /// Give back the container.
    pub fn into_container(self) -> Container {
        self.container
    }

    /// Canonical path of the working directory.
    pub fn cwd(&self) -> String {
        self.tree.cwd_path()
    }

    /// Full container path for a file argument.
    ///
    /// Arguments starting with `\` are absolute; anything else is a name in
    /// the working directory.
    pub fn full_path(&self, name: &str) -> String {
        if name.starts_with(SEPARATOR) {
            name.to_string()
        } else {
            join_path(&self.cwd(), name)
        }
    }

    /// Copy a host file into the working directory as `name`.
    pub fn copy_in(&mut self, source: &Path, name: &str) -> Result<String> {
        validate_name(name)?;
        let cwd = self.tree.cwd();
        if self.tree.child_dir(cwd, name).is_some() {
            return Err(Error::already_exists(self.full_path(name)));
        }

        let full_path = self.full_path(name);
        self.container.ingest_file(source, &full_path)?;
        self.tree.add_file(cwd, name);
        Ok(full_path)
    }

    /// Copy a stored file out to the host.
    pub fn copy_out(&self, name: &str, dest: &Path) -> Result<u64> {
        self.container.extract_to_file(&self.full_path(name), dest)
    }

    /// Stream a stored file to a writer.
    pub fn cat<W: std::io::Write>(&self, name: &str, sink: W) -> Result<u64> {
        self.container.extract(&self.full_path(name), sink)
    }

    /// Remove a stored file from the container and the tree.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let full_path = self.full_path(name);
        self.container.remove(&full_path)?;

        let (dir, file) = split_path(&full_path);
        if let Some(node) = self.tree.resolve(dir) {
            self.tree.remove_file(node, file);
        }
        Ok(())
    }

    /// List the working directory: subdirectories first, then files with sizes.
    pub fn list(&self) -> Listing {
        self.listing(self.tree.cwd())
    }

    /// List a directory by path without moving the working directory.
    pub fn list_at(&self, target: &str) -> Result<Listing> {
        let id = self
            .tree
            .resolve(target)
            .ok_or_else(|| Error::not_found(self.full_path(target)))?;
        Ok(self.listing(id))
    }

    fn listing(&self, id: NodeId) -> Listing {
        let dir_path = self.tree.full_path(id);
        let dirs = self.tree.dirs(id).into_iter().map(str::to_string).collect();
        let files = self
            .tree
            .files(id)
            .into_iter()
            .map(|name| ListedFile {
                name: name.to_string(),
                size: self.container.size_of(&join_path(&dir_path, name)),
            })
            .collect();

        Listing {
            path: dir_path,
            dirs,
            files,
        }
    }

    /// Create a directory under the working directory.
    pub fn make_dir(&mut self, name: &str) -> Result<String> {
        let id = self.tree.make_dir(name)?;
        Ok(self.tree.full_path(id))
    }

    /// Change the working directory (`\`, `..`, or a directory path).
    pub fn change_dir(&mut self, target: &str) -> Result<String> {
        let id = self.tree.change_dir(target)?;
        Ok(self.tree.full_path(id))
    }

    /// Remove a subdirectory and every file stored beneath it.
    ///
    /// Returns the number of files removed from the container.
    pub fn remove_dir(&mut self, name: &str) -> Result<usize> {
        let cwd = self.tree.cwd();
        let dir = self
            .tree
            .child_dir(cwd, name)
            .ok_or_else(|| Error::not_found(self.full_path(name)))?;

        // The tree only changes once the container rewrite has succeeded
        let removed = self.container.remove_many(self.tree.files_under(dir))?;
        self.tree.remove_dir(name)?;
        debug!(dir = name, removed, "removed directory");
        Ok(removed)
    }

    /// Recursively copy a host directory into the working directory.
    ///
    /// Honors `.gitignore` files. All files are written with a single
    /// container rewrite. If the walk fails part way, files staged so far are
    /// still persisted; if the rewrite itself fails, nothing is kept.
    pub fn import_dir(&mut self, source: &Path) -> Result<ImportStats> {
        if !source.is_dir() {
            return Err(Error::source_unavailable(source));
        }

        let base = self.cwd();
        let tree_before = self.tree.clone();
        let mut stats = ImportStats::default();
        let outcome = self.stage_dir(source, &base, &mut stats);

        if stats.files > 0
            && let Err(err) = self.container.persist()
        {
            self.container.unstage(stats.files);
            self.tree = tree_before;
            return Err(err);
        }
        outcome?;

        debug!(source = %source.display(), files = stats.files, bytes = stats.bytes, "imported directory");
        Ok(stats)
    }

    fn stage_dir(&mut self, source: &Path, base: &str, stats: &mut ImportStats) -> Result<()> {
        let walker = ignore::WalkBuilder::new(source)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        let own_file = fs::canonicalize(self.container.path()).ok();

        for entry in walker {
            let entry = entry?;
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if !is_file {
                continue;
            }
            // Never ingest the container into itself
            if own_file.is_some() && fs::canonicalize(entry.path()).ok() == own_file {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| Error::source_unavailable(entry.path()))?;

            let mut names = Vec::new();
            for part in relative.components() {
                let name = part
                    .as_os_str()
                    .to_str()
                    .ok_or_else(|| Error::invalid_name(format!("Non UTF-8 name: {}", relative.display())))?;
                validate_name(name)?;
                names.push(name);
            }
            let Some((file_name, dirs)) = names.split_last() else {
                continue;
            };

            let mut dir_path = base.to_string();
            for dir in dirs {
                let next = join_path(&dir_path, dir);
                if let Some(parent) = self.tree.resolve(&dir_path)
                    && self.tree.has_file(parent, dir)
                {
                    return Err(Error::already_exists(next));
                }
                dir_path = next;
            }
            let full_path = join_path(&dir_path, file_name);
            if let Some(dir) = self.tree.resolve(&dir_path)
                && self.tree.child_dir(dir, file_name).is_some()
            {
                return Err(Error::already_exists(full_path));
            }

            let data = fs::read(entry.path())?;
            self.container.stage_ingest(&data, &full_path)?;
            let node = self.tree.ensure_dir(&dir_path);
            self.tree.add_file(node, file_name);

            stats.files += 1;
            stats.bytes += data.len() as u64;
        }
        Ok(())
    }
}

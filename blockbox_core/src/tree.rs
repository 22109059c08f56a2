//! In-memory directory tree projected from stored file paths.
//!
//! Nodes live in an arena and refer to their parent by index, so the tree has
//! no ownership cycles. Removed directories are unlinked and emptied; their
//! indices are never reused while the tree is alive.

use crate::error::{Error, Result};
use crate::path::{self, ROOT, join_path, split_path, validate_name};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Index of a directory node in a [`DirTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    dirs: BTreeMap<String, NodeId>,
    files: BTreeSet<String>,
}

impl Node {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            dirs: BTreeMap::new(),
            files: BTreeSet::new(),
        }
    }
}

/// Directory tree with a current working directory.
#[derive(Debug, Clone)]
pub struct DirTree {
    nodes: Vec<Node>,
    cwd: NodeId,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    const ROOT_ID: NodeId = NodeId(0);

    /// Create a tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(ROOT, None)],
            cwd: Self::ROOT_ID,
        }
    }

    /// Build the tree from full file paths.
    ///
    /// Each path is split at its last separator; missing directories are
    /// created top-down and the leaf name is attached as a file. Paths that
    /// name no file are skipped.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for full_path in paths {
            let full_path = full_path.as_ref();
            let (dir, file) = split_path(full_path);
            if file.is_empty() {
                warn!(path = full_path, "skipping stored path without a file name");
                continue;
            }
            let node = tree.ensure_dir(dir);
            tree.node_mut(node).files.insert(file.to_string());
        }
        tree
    }

    /// The root directory.
    pub fn root(&self) -> NodeId {
        Self::ROOT_ID
    }

    /// The current working directory.
    pub fn cwd(&self) -> NodeId {
        self.cwd
    }

    /// Canonical path of the current working directory.
    pub fn cwd_path(&self) -> String {
        self.full_path(self.cwd)
    }

    /// Name of a directory (`\` for the root).
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    /// Parent of a directory, or `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Canonical path of a directory.
    pub fn full_path(&self, id: NodeId) -> String {
        match self.node(id).parent {
            None => ROOT.to_string(),
            Some(parent) => join_path(&self.full_path(parent), &self.node(id).name),
        }
    }

    /// Named child directory of `id`.
    pub fn child_dir(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).dirs.get(name).copied()
    }

    /// Child directory names of `id`, sorted.
    pub fn dirs(&self, id: NodeId) -> Vec<&str> {
        self.node(id).dirs.keys().map(String::as_str).collect()
    }

    /// File names directly in `id`, sorted.
    pub fn files(&self, id: NodeId) -> Vec<&str> {
        self.node(id).files.iter().map(String::as_str).collect()
    }

    /// True if `id` directly contains a file called `name`.
    pub fn has_file(&self, id: NodeId, name: &str) -> bool {
        self.node(id).files.contains(name)
    }

    /// Find a directory by path, absolute (`\A\B`) or relative to the cwd.
    ///
    /// Relative paths may step up with `..`.
    pub fn resolve(&self, target: &str) -> Option<NodeId> {
        let mut current = if target.starts_with(path::SEPARATOR) {
            Self::ROOT_ID
        } else {
            self.cwd
        };

        for part in path::components(target) {
            current = match part {
                "." => current,
                ".." => self.node(current).parent.unwrap_or(current),
                name => self.child_dir(current, name)?,
            };
        }
        Some(current)
    }

    /// Get the directory at `dir_path`, creating any missing levels.
    pub fn ensure_dir(&mut self, dir_path: &str) -> NodeId {
        let mut current = Self::ROOT_ID;
        let parts: Vec<String> = path::components(dir_path).map(str::to_string).collect();
        for part in parts {
            current = match self.child_dir(current, &part) {
                Some(child) => child,
                None => self.insert_dir(current, part),
            };
        }
        current
    }

    /// Attach a file name to a directory. Returns `false` if it was already there.
    pub fn add_file(&mut self, dir: NodeId, name: &str) -> bool {
        self.node_mut(dir).files.insert(name.to_string())
    }

    /// Detach a file name from a directory. Returns `false` if it was absent.
    pub fn remove_file(&mut self, dir: NodeId, name: &str) -> bool {
        self.node_mut(dir).files.remove(name)
    }

    /// Create a directory under the cwd.
    pub fn make_dir(&mut self, name: &str) -> Result<NodeId> {
        validate_name(name)?;
        let cwd = self.cwd;
        if self.child_dir(cwd, name).is_some() || self.has_file(cwd, name) {
            return Err(Error::already_exists(join_path(&self.cwd_path(), name)));
        }
        Ok(self.insert_dir(cwd, name.to_string()))
    }

    /// Change the cwd: `\` goes to the root, `..` to the parent (a no-op at
    /// the root), anything else is resolved as a directory path.
    pub fn change_dir(&mut self, target: &str) -> Result<NodeId> {
        let next = match target {
            ROOT => Self::ROOT_ID,
            ".." => self.node(self.cwd).parent.unwrap_or(self.cwd),
            _ => self
                .resolve(target)
                .ok_or_else(|| Error::not_found(join_path(&self.cwd_path(), target)))?,
        };
        self.cwd = next;
        Ok(next)
    }

    /// Remove a child directory of the cwd and everything beneath it.
    ///
    /// Returns the full paths of every file that was under it.
    pub fn remove_dir(&mut self, name: &str) -> Result<Vec<String>> {
        let cwd = self.cwd;
        let id = self
            .child_dir(cwd, name)
            .ok_or_else(|| Error::not_found(join_path(&self.cwd_path(), name)))?;

        let files = self.files_under(id);
        self.node_mut(cwd).dirs.remove(name);
        self.clear_subtree(id);
        Ok(files)
    }

    /// Full paths of every file in `id` and its subdirectories.
    pub fn files_under(&self, id: NodeId) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![(id, self.full_path(id))];
        while let Some((dir, dir_path)) = stack.pop() {
            let node = self.node(dir);
            out.extend(node.files.iter().map(|f| join_path(&dir_path, f)));
            for (name, &child) in &node.dirs {
                stack.push((child, join_path(&dir_path, name)));
            }
        }
        out.sort();
        out
    }

    fn insert_dir(&mut self, parent: NodeId, name: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name.clone(), Some(parent)));
        self.node_mut(parent).dirs.insert(name, id);
        id
    }

    fn clear_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(dir) = stack.pop() {
            let node = self.node_mut(dir);
            node.files.clear();
            stack.extend(std::mem::take(&mut node.dirs).into_values());
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

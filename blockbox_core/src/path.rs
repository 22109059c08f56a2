//! Container path handling.
//!
//! Container paths use `\` as the separator. The root is exactly `\`; every
//! other canonical path starts with `\` and never ends with one.

use crate::error::{Error, Result};

/// Path separator inside a container.
pub const SEPARATOR: char = '\\';

/// Canonical path of the root directory.
pub const ROOT: &str = "\\";

/// Maximum length of a single file or directory name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Split a full path at its last separator into `(directory, file_name)`.
///
/// A path without a separator, or with only a leading one, lives in the root.
/// An empty path or the root itself yields an empty file name.
pub fn split_path(full_path: &str) -> (&str, &str) {
    if full_path.trim().is_empty() || full_path == ROOT {
        return (ROOT, "");
    }

    match full_path.rfind(SEPARATOR) {
        None => (ROOT, full_path),
        Some(0) => (ROOT, &full_path[1..]),
        Some(last) => (&full_path[..last], &full_path[last + 1..]),
    }
}

/// Join a directory path and a child name, never doubling the separator at the root.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("{ROOT}{name}")
    } else {
        format!("{dir}{SEPARATOR}{name}")
    }
}

/// Non-empty components of a directory path, root first.
///
/// Empty segments (leading separator, doubled separators) are skipped.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|part| !part.trim().is_empty())
}

/// Check that `name` can be used as a single file or directory name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name("Name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_name(format!(
            "Name too long: {} bytes (max {})",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    if name.contains(SEPARATOR) {
        return Err(Error::invalid_name(format!(
            "Name cannot contain '{SEPARATOR}': {name}"
        )));
    }

    if name.contains('\0') {
        return Err(Error::invalid_name("Name cannot contain null bytes"));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_name(format!("Reserved name: {name}")));
    }

    Ok(())
}

/// Check that `full_path` is a canonical file path (`\a\b\file`).
pub fn validate_full_path(full_path: &str) -> Result<()> {
    let Some(rest) = full_path.strip_prefix(SEPARATOR) else {
        return Err(Error::invalid_name(format!(
            "Path must start with '{SEPARATOR}': {full_path}"
        )));
    };

    if rest.is_empty() {
        return Err(Error::invalid_name("Path names no file"));
    }

    rest.split(SEPARATOR).try_for_each(validate_name)
}

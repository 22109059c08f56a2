//! Error types for blockbox_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using blockbox_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during container operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// No file or directory exists at the given container path.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// A block identifier does not resolve to a live block.
    #[error("Block not found: {id}")]
    BlockNotFound { id: String },

    /// A file or directory already exists at the given container path.
    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    /// The container blob is truncated or malformed.
    #[error("Corrupt container at {path}: {reason}")]
    CorruptContainer { path: PathBuf, reason: String },

    /// The host file to ingest does not exist or is not a regular file.
    #[error("Source unavailable: {path}")]
    SourceUnavailable { path: PathBuf },

    /// Rejected container configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Invalid hash key format.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Invalid file or directory name.
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },
}

impl Error {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    /// Create a BlockNotFound error.
    pub fn block_not_found(id: impl ToString) -> Self {
        Error::BlockNotFound { id: id.to_string() }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Error::AlreadyExists { path: path.into() }
    }

    /// Create a CorruptContainer error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptContainer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a SourceUnavailable error.
    pub fn source_unavailable(path: impl Into<PathBuf>) -> Self {
        Error::SourceUnavailable { path: path.into() }
    }

    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidName error.
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Error::InvalidName {
            reason: reason.into(),
        }
    }

    /// True for errors that mean "nothing at that path".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::BlockNotFound { .. })
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

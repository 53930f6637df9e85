// Shasplit backup engine.

//! Error types for the repository engine.
//!
//! Modeled on conserve's own `transport::Error`: a flat, non-exhaustive enum whose
//! variants carry the context a caller needs to explain the failure without
//! re-deriving it from a bare [std::io::Error].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can be returned by the repository engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("repository not found at {path:?}")]
    RepositoryNotFound { path: PathBuf },

    #[error("no backups found for {name:?}")]
    NameNotFound { name: String },

    #[error("no instance {timestamp:?} for {name:?}")]
    InstanceNotFound { name: String, timestamp: String },

    #[error("instance already exists: {path:?}")]
    AlreadyExists { path: PathBuf },

    #[error("too many parts: part {index} exceeds maxparts {maxparts}")]
    TooManyParts { index: u64, maxparts: u64 },

    #[error("integrity error: expected size {expected}, actual size {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("integrity error: negative expected size {expected}")]
    NegativeExpectedSize { expected: i64 },

    #[error("integrity error: expected hash {expected:?}, actual hash {actual:?}")]
    HashMismatch { expected: String, actual: String },

    #[error("integrity error: malformed symlink target {target:?} at {path:?}")]
    MalformedSymlinkTarget { path: PathBuf, target: PathBuf },

    #[error("incomplete backup: {name:?} at {timestamp:?} is missing hash/size metadata")]
    IncompleteBackup { name: String, timestamp: String },

    #[error("no completed backup available for {name:?}")]
    NoCompletedBackup { name: String },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("subprocess {command:?} failed: {message}")]
    Subprocess { command: String, message: String },

    #[error("snapshot block device not found: {path:?}")]
    NotFoundBlockDevice { path: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

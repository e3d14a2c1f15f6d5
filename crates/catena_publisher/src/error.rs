//! # Publisher Error Types

use std::path::Path;

use catena_core::CatenaError;
use thiserror::Error;

/// Errors that stop a batch or the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublisherError {
    /// Reading or writing the store file failed.
    #[error("{action} {path}: {message}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// File involved.
        path: String,
        /// Underlying I/O error.
        message: String,
    },

    /// The store file is not a JSON object of entries.
    #[error("invalid store {path}: {message}")]
    InvalidStore {
        /// File involved.
        path: String,
        /// Parse failure.
        message: String,
    },

    /// An entry could not be read or written.
    #[error("invalid entry {id}: {message}")]
    InvalidEntry {
        /// Entry key.
        id: String,
        /// Parse failure.
        message: String,
    },

    /// No entry with this key.
    #[error("unknown entry {0}")]
    UnknownEntry(String),

    /// The batch was shut down before an entry could be scheduled.
    #[error("batch cancelled")]
    Cancelled,

    /// Invalid command line or configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from the binding layer.
    #[error(transparent)]
    Core(#[from] CatenaError),
}

impl PublisherError {
    pub(crate) fn io(action: &'static str, path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for publisher operations.
pub type PublisherResult<T> = Result<T, PublisherError>;

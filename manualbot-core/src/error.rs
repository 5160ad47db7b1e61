//! Error types for cache operations
//!
//! This module defines the error type shared by the cache store and its
//! configuration, plus the validation error for retry settings. Completion
//! errors live in [`crate::completion`] because their variants drive the
//! retry state machine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error while touching the cache directory
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted entry could not be parsed or is missing fields
    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization error while writing an entry
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid retry settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryConfigError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

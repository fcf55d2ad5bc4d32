//! Storage Backend Error Types

use std::io;
use thiserror::Error;

/// Errors raised by document and blob store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document or blob not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document with this key already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Blob segment failed its checksum
    #[error("Checksum mismatch in blob '{id}' segment {segment}")]
    ChecksumMismatch { id: String, segment: usize },

    /// Generic backend failure
    #[error("{0}")]
    Backend(String),
}

/// Result type for storage backend operations
pub type StoreResult<T> = Result<T, StoreError>;

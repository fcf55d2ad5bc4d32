//! Engine Error Types
//!
//! Three families matter to callers:
//! - validation (`NodesWithSameIndex`, `IndexOutOfSequence`,
//!   `InvalidIndexValue`): raised while chunking, before anything is written
//! - capacity (`Capacity`): a chunk is still too large after its data
//!   moved to the blob store
//! - store (`Store`): a backend failure, tagged with the operation and uri

use std::fmt;
use thiserror::Error;

use crate::storage::StoreError;

/// The store operation that was running when a backend call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Adding,
    Updating,
    Deleting,
    Reading,
    Merging,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Adding => "adding",
            StoreOperation::Updating => "updating",
            StoreOperation::Deleting => "deleting",
            StoreOperation::Reading => "reading",
            StoreOperation::Merging => "merging",
        };
        f.write_str(name)
    }
}

/// Channel data engine errors
#[derive(Error, Debug)]
pub enum ChunkError {
    /// Two consecutive records share a primary index value
    #[error("Nodes with same index: {mnemonic} = {index}")]
    NodesWithSameIndex { mnemonic: String, index: f64 },

    /// A record breaks the declared index direction
    #[error("Index out of sequence: {mnemonic} {index} follows {previous} (increasing = {increasing})")]
    IndexOutOfSequence {
        mnemonic: String,
        previous: f64,
        index: f64,
        increasing: bool,
    },

    /// An index cell could not be read as a time or depth value
    #[error("Invalid value for index '{mnemonic}': {value}")]
    InvalidIndexValue { mnemonic: String, value: String },

    /// Chunk document exceeds the maximum size even without inline data
    #[error("Chunk '{uid}' is {size} bytes, exceeding the {limit} byte document limit")]
    Capacity {
        uid: String,
        size: usize,
        limit: usize,
    },

    /// Backend failure with context
    #[error("Store error while {operation} '{uri}': {source}")]
    Store {
        operation: StoreOperation,
        uri: String,
        #[source]
        source: StoreError,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed reader or chunk contents
    #[error("Invalid channel data: {0}")]
    InvalidData(String),
}

impl ChunkError {
    /// Wrap a backend error with the operation and parent uri.
    pub fn store(operation: StoreOperation, uri: impl Into<String>, source: StoreError) -> Self {
        ChunkError::Store {
            operation,
            uri: uri.into(),
            source,
        }
    }

    /// Raised while validating input, before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChunkError::NodesWithSameIndex { .. }
                | ChunkError::IndexOutOfSequence { .. }
                | ChunkError::InvalidIndexValue { .. }
        )
    }
}

/// Result type for engine operations
pub type ChunkResult<T> = Result<T, ChunkError>;

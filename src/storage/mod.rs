//! Storage Module
//!
//! Persists channel data chunks through two narrow backend contracts:
//! - `DocumentStore`: chunk documents, filtered by uri and index range
//! - `BlobStore`: row payloads too large to keep inline
//!
//! ## Layout
//!
//! ```text
//! ChunkStoreAdapter
//!     |-- DocumentStore   (find / bulk_write / delete_many / create_index)
//!     |-- BlobStore       (upload / download / delete, keyed by chunk uid)
//!     `-- FetchLimiter    (how far a range read may go)
//! ```
//!
//! `MemoryDocumentStore`, `MemoryBlobStore` and `FileBlobStore` are the
//! bundled backends.

pub mod adapter;
pub mod blob;
pub mod error;
pub mod limiter;
pub mod memory;
pub mod transaction;

pub use adapter::{BulkWriteSummary, ChunkStoreAdapter, CHUNK_COLLECTION};
pub use blob::FileBlobStore;
pub use error::{StoreError, StoreResult};
pub use limiter::FetchLimiter;
pub use memory::{MemoryBlobStore, MemoryDocumentStore};
pub use transaction::{Transaction, TransactionEntry};

use crate::channel::ChannelDataChunk;
use crate::range::Range;

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Fails if the uid exists
    Insert(ChannelDataChunk),
    /// Fails if the uid does not exist
    Update(ChannelDataChunk),
    /// Insert or replace
    Upsert(ChannelDataChunk),
    /// No-op if the uid does not exist
    Delete { uid: String },
}

/// Selects the chunks of one parent whose primary range meets `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFilter {
    pub uri: String,
    pub primary_mnemonic: Option<String>,
    pub range: Range<f64>,
    pub increasing: bool,
}

impl ChunkFilter {
    pub fn for_uri(uri: &str) -> Self {
        ChunkFilter {
            uri: uri.to_lowercase(),
            primary_mnemonic: None,
            range: Range::unbounded(),
            increasing: true,
        }
    }

    pub fn matches(&self, chunk: &ChannelDataChunk) -> bool {
        if !chunk.uri.eq_ignore_ascii_case(&self.uri) {
            return false;
        }
        let Some(primary) = chunk.primary_index() else {
            return false;
        };
        if let Some(mnemonic) = &self.primary_mnemonic {
            if !primary.mnemonic.eq_ignore_ascii_case(mnemonic) {
                return false;
            }
        }
        primary.range().overlaps(&self.range, self.increasing)
    }
}

/// Order of `find` results by `indices[0].start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSort {
    Ascending,
    Descending,
}

/// Indexes a document backend should maintain for chunk queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSpec {
    /// `(uri)`
    Uri,
    /// `(uri, indices[0].start, indices[0].end)`
    UriRange,
}

/// Chunk document backend.
pub trait DocumentStore: Send + Sync {
    /// Matching chunks, sorted.
    fn find(&self, filter: &ChunkFilter, sort: ChunkSort) -> StoreResult<Vec<ChannelDataChunk>>;

    /// Apply all operations; stops at the first failure.
    fn bulk_write(&self, ops: Vec<WriteOp>) -> StoreResult<()>;

    /// Delete every chunk of `uri`, returning the deleted uids.
    fn delete_many(&self, uri: &str) -> StoreResult<Vec<String>>;

    fn create_index(&self, spec: IndexSpec) -> StoreResult<()>;
}

/// Blob backend for externalized chunk data.
pub trait BlobStore: Send + Sync {
    fn upload(&self, id: &str, bytes: &[u8]) -> StoreResult<()>;

    fn download(&self, id: &str) -> StoreResult<Vec<u8>>;

    /// No-op if the blob does not exist.
    fn delete(&self, id: &str) -> StoreResult<()>;
}

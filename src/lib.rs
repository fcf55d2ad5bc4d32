//! # Channel Store
//!
//! Chunked storage for growing, multi-channel drilling logs. A log's
//! rows are partitioned by primary index (depth or time) into bounded
//! chunks that can be merged with new data and partially deleted without
//! touching unaffected rows.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! ChannelDataReader
//!     ↓
//! [Chunk Builder]       → ChannelDataChunk (lazy, bucketed by index)
//!     ↓
//! [Chunk Store Adapter] → DocumentStore + BlobStore
//!
//! ChannelDataReader + stored chunks
//!     ↓
//! [Merge Engine]        → re-chunked rows, reused uids, delete markers
//!     ↓
//! [Chunk Store Adapter]
//!
//! stored chunks
//!     ↓
//! [Partial Delete]      → trimmed chunks + SurvivedRanges
//!     ↓
//! [Chunk Store Adapter]
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use channel_store::{ChannelDataStore, Config, PartialDeleteRequest, Range};
//!
//! let config = Config::load()?;
//! let _guard = channel_store::logging::init(&config.logging);
//! let store = ChannelDataStore::in_memory(&config)?;
//!
//! store.add(initial_reader, None)?;
//! store.merge(update_reader, None)?;
//!
//! let request = PartialDeleteRequest::new()
//!     .channel("GR")
//!     .range("ROP", Range::bounded(1200.0, 1300.0));
//! let (_summary, survived) = store.partial_delete(uri, &request, None)?;
//! ```

pub mod channel; // Chunk documents, index metadata, row readers
pub mod chunking; // Chunk building, merging, partial delete
pub mod config; // Configuration system
pub mod error; // Engine error types
pub mod logging; // Tracing subscriber setup
pub mod range; // Direction-aware ranges
pub mod storage; // Document and blob backends
pub mod storage_engine; // Channel data store facade

pub use channel::{
    ChannelDataChunk, ChannelDataReader, ChannelIndexInfo, ChannelLayout, ChannelRecord,
    IndexValue,
};
pub use chunking::{
    build_chunks, merge_chunks, ChunkBuilder, MergeStrategy, MergeSummary, PartialDeleteRequest,
    PartialDeleteSummary, SurvivedRanges,
};
pub use config::{ChunkingConfig, Config, LoggingConfig, StoreConfig};
pub use error::{ChunkError, ChunkResult, StoreOperation};
pub use range::{compute_range, Range};
pub use storage::{
    BlobStore, BulkWriteSummary, ChunkFilter, ChunkSort, ChunkStoreAdapter, DocumentStore,
    FetchLimiter, FileBlobStore, IndexSpec, MemoryBlobStore, MemoryDocumentStore, StoreError,
    StoreResult, Transaction, WriteOp,
};
pub use storage_engine::ChannelDataStore;

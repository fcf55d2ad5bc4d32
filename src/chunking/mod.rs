//! Chunking Module
//!
//! Turns ordered channel records into bounded chunks and edits stored
//! chunks in place:
//! - `builder`: partition a record stream by primary index bucket
//! - `merge`: fold an update into the stored chunks it touches
//! - `partial_delete`: remove channels or channel ranges from chunks
//!
//! Everything here is pure. Reading and writing chunks is the storage
//! layer's job.

pub mod builder;
pub mod merge;
pub mod partial_delete;

pub use builder::{build_chunks, ChunkBuilder};
pub use merge::{classify, merge_chunks, merge_window, MergeOutcome, MergeStrategy, MergeSummary};
pub use partial_delete::{
    partial_delete, partial_delete_chunk, ChunkDeleteOutcome, PartialDeleteRequest,
    PartialDeleteSummary, SurvivedRanges,
};

//! Storage Engine - Channel Data Operations
//!
//! Provides:
//! - Initial load of a log's channel data (`add`)
//! - Growth and correction of stored data (`merge`)
//! - Removal of channels or channel ranges (`partial_delete`)
//! - Whole-log removal (`delete`) and range reads (`get`, `get_reader`)
//!
//! Every write goes through one `bulk_write`, so a failure before it
//! leaves the store untouched. Pass a `Transaction` to be able to undo a
//! write that succeeded.
//!
//! ## Example
//!
//! ```rust
//! use channel_store::{ChannelDataReader, ChannelDataStore, ChannelIndexInfo, ChannelLayout, Config};
//! use serde_json::json;
//!
//! let store = ChannelDataStore::in_memory(&Config::default()).unwrap();
//! let layout = ChannelLayout::new(
//!     "eml://witsml14/well(w1)/wellbore(b1)/log(l1)",
//!     vec![ChannelIndexInfo::depth("MD", "m", true)],
//!     vec!["GR".to_string()],
//!     vec!["gAPI".to_string()],
//!     vec!["-999.25".to_string()],
//! )
//! .unwrap();
//! let rows = vec![vec![json!(0.0), json!(12.5)], vec![json!(1.0), json!(13.0)]];
//!
//! store.add(ChannelDataReader::new(layout, rows).unwrap(), None).unwrap();
//! let chunks = store.get("eml://witsml14/well(w1)/wellbore(b1)/log(l1)").unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::channel::{ChannelDataChunk, ChannelDataReader};
use crate::chunking::{
    build_chunks, merge_chunks, merge_window, partial_delete, MergeSummary, PartialDeleteRequest,
    PartialDeleteSummary, SurvivedRanges,
};
use crate::config::{ChunkingConfig, Config};
use crate::error::{ChunkError, ChunkResult, StoreOperation};
use crate::range::Range;
use crate::storage::{
    BlobStore, BulkWriteSummary, ChunkStoreAdapter, DocumentStore, FetchLimiter, FileBlobStore,
    MemoryBlobStore, MemoryDocumentStore, Transaction, CHUNK_COLLECTION,
};

/// Channel data store for growing logs.
pub struct ChannelDataStore<D, B> {
    adapter: ChunkStoreAdapter<D, B>,
    chunking: ChunkingConfig,
}

impl ChannelDataStore<MemoryDocumentStore, MemoryBlobStore> {
    /// Store backed entirely by memory.
    pub fn in_memory(config: &Config) -> ChunkResult<Self> {
        Self::new(MemoryDocumentStore::new(), MemoryBlobStore::new(), config)
    }
}

impl ChannelDataStore<MemoryDocumentStore, FileBlobStore> {
    /// In-memory documents with blobs under `store.blob_dir` (default `./blobs`).
    pub fn with_file_blobs(config: &Config) -> ChunkResult<Self> {
        let dir = config
            .store
            .blob_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("blobs"));
        let blobs = FileBlobStore::new(&dir, config.store.blob_chunk_size)
            .map_err(|e| ChunkError::store(StoreOperation::Adding, dir.display().to_string(), e))?;
        Self::new(MemoryDocumentStore::new(), blobs, config)
    }
}

impl<D: DocumentStore, B: BlobStore> ChannelDataStore<D, B> {
    /// Wrap the given backends and make sure their indexes exist.
    pub fn new(documents: D, blobs: B, config: &Config) -> ChunkResult<Self> {
        let adapter = ChunkStoreAdapter::new(documents, blobs, config.store.clone());
        adapter.ensure_indexes()?;
        Ok(ChannelDataStore {
            adapter,
            chunking: config.chunking.clone(),
        })
    }

    pub fn adapter(&self) -> &ChunkStoreAdapter<D, B> {
        &self.adapter
    }

    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    fn max_data_nodes(&self) -> usize {
        self.adapter.config().max_data_nodes
    }

    /// Chunk and insert the data of a log that has none stored yet.
    ///
    /// Records must already be in index order. All chunks are built
    /// before anything is written.
    pub fn add(
        &self,
        reader: ChannelDataReader,
        tx: Option<&mut Transaction>,
    ) -> ChunkResult<BulkWriteSummary> {
        let uri = reader.uri().to_string();
        let records = reader.len();
        let chunks = build_chunks(reader, &self.chunking).collect::<ChunkResult<Vec<_>>>()?;

        debug!(uri = %uri, records, chunks = chunks.len(), "chunk_add");
        self.adapter.bulk_write(&uri, chunks, tx)
    }

    /// Merge new or corrected rows into the stored chunks of a log.
    ///
    /// Rows sharing an index with stored rows overwrite the channels they
    /// carry. The update is sorted first.
    pub fn merge(
        &self,
        mut reader: ChannelDataReader,
        mut tx: Option<&mut Transaction>,
    ) -> ChunkResult<MergeSummary> {
        reader.sort()?;
        let Some(window) = merge_window(&reader, &self.chunking)? else {
            return Ok(MergeSummary::default());
        };

        let uri = reader.uri().to_string();
        let primary = reader.primary_index().mnemonic.clone();
        let increasing = reader.increasing();
        info!(
            uri = %uri,
            records = reader.len(),
            window_start = ?window.start,
            window_end = ?window.end,
            "chunk_merge_start"
        );

        let existing = self.adapter.get(
            &uri,
            Some(&primary),
            &window,
            increasing,
            FetchLimiter::search_until_found(self.max_data_nodes()),
        )?;
        if let Some(tx) = tx.as_deref_mut() {
            for chunk in &existing {
                tx.attach(CHUNK_COLLECTION, &chunk.uid, &uri, Some(chunk.clone()));
            }
        }

        let outcome = merge_chunks(existing, reader, &self.chunking)?;
        self.adapter
            .bulk_write(&uri, outcome.chunks, tx)
            .map_err(|e| match e {
                ChunkError::Store { uri, source, .. } => {
                    ChunkError::store(StoreOperation::Merging, uri, source)
                }
                other => other,
            })?;

        info!(
            uri = %uri,
            inserted = outcome.summary.inserted,
            updated = outcome.summary.updated,
            deleted = outcome.summary.deleted,
            records = outcome.summary.records,
            "chunk_merge_complete"
        );
        Ok(outcome.summary)
    }

    /// Remove channels or channel ranges from every chunk of `uri`.
    ///
    /// Returns the per-chunk counts and the index ranges that still hold
    /// data, for the caller to update its log header with.
    pub fn partial_delete(
        &self,
        uri: &str,
        request: &PartialDeleteRequest,
        mut tx: Option<&mut Transaction>,
    ) -> ChunkResult<(PartialDeleteSummary, SurvivedRanges)> {
        let mut survived = SurvivedRanges::default();
        if request.is_empty() {
            return Ok((PartialDeleteSummary::default(), survived));
        }

        let chunks = self.adapter.get(
            uri,
            None,
            &Range::unbounded(),
            true,
            FetchLimiter::search_until_found(self.max_data_nodes()),
        )?;
        let originals: HashMap<String, ChannelDataChunk> = if tx.is_some() {
            chunks.iter().map(|c| (c.uid.clone(), c.clone())).collect()
        } else {
            HashMap::new()
        };

        let (changed, summary) = partial_delete(chunks, request, &mut survived)?;
        if let Some(tx) = tx.as_deref_mut() {
            for chunk in &changed {
                let before = originals.get(&chunk.uid).cloned();
                tx.attach(CHUNK_COLLECTION, &chunk.uid, uri, before);
            }
        }

        if !changed.is_empty() {
            self.adapter.bulk_write(uri, changed, tx)?;
        }
        info!(
            uri = %uri,
            unchanged = summary.unchanged,
            updated = summary.updated,
            deleted = summary.deleted,
            "chunk_partial_delete"
        );
        Ok((summary, survived))
    }

    /// Delete all channel data of `uri`. Returns the number of chunks removed.
    pub fn delete(&self, uri: &str) -> ChunkResult<usize> {
        self.adapter.delete(uri)
    }

    /// Every stored chunk of `uri`, bounded by `store.max_data_nodes`.
    pub fn get(&self, uri: &str) -> ChunkResult<Vec<ChannelDataChunk>> {
        self.get_range(uri, &Range::unbounded(), true)
    }

    /// Chunks of `uri` overlapping `range`, bounded by `store.max_data_nodes`.
    pub fn get_range(
        &self,
        uri: &str,
        range: &Range<f64>,
        increasing: bool,
    ) -> ChunkResult<Vec<ChannelDataChunk>> {
        self.adapter.get(
            uri,
            None,
            range,
            increasing,
            FetchLimiter::strict(self.max_data_nodes()),
        )
    }

    /// Rows of `uri` inside `range`; `None` when nothing is stored.
    pub fn get_reader(
        &self,
        uri: &str,
        range: &Range<f64>,
        increasing: bool,
    ) -> ChunkResult<Option<ChannelDataReader>> {
        self.adapter.get_reader(
            uri,
            None,
            range,
            increasing,
            FetchLimiter::strict(self.max_data_nodes()),
        )
    }
}

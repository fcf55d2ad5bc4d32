//! Chunk Store Adapter
//!
//! Reads and writes `ChannelDataChunk` documents on top of a
//! `DocumentStore`, moving large row payloads to a `BlobStore`.
//!
//! ## Write rules
//!
//! | chunk                        | document op          | blob                      |
//! |------------------------------|----------------------|---------------------------|
//! | empty uid, has rows          | insert (new uuid v4) | upload if over threshold  |
//! | uid, has rows                | update               | upload, or drop stale one |
//! | uid, delete marker           | delete               | delete                    |
//!
//! Reads only rehydrate the chunks that survive the fetch limiter.

use tracing::{debug, info};
use uuid::Uuid;

use super::transaction::Transaction;
use super::{
    BlobStore, ChunkFilter, ChunkSort, DocumentStore, FetchLimiter, IndexSpec, StoreError,
    WriteOp,
};
use crate::channel::{ChannelDataChunk, ChannelDataReader};
use crate::config::StoreConfig;
use crate::error::{ChunkError, ChunkResult, StoreOperation};
use crate::range::Range;

/// Collection name recorded in transaction entries.
pub const CHUNK_COLLECTION: &str = "channelDataChunk";

/// What one bulk write did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Chunks whose data went to the blob store
    pub externalized: usize,
}

impl BulkWriteSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Chunk persistence over a document and a blob backend.
pub struct ChunkStoreAdapter<D, B> {
    documents: D,
    blobs: B,
    config: StoreConfig,
}

impl<D: DocumentStore, B: BlobStore> ChunkStoreAdapter<D, B> {
    pub fn new(documents: D, blobs: B, config: StoreConfig) -> Self {
        ChunkStoreAdapter {
            documents,
            blobs,
            config,
        }
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create the `(uri)` and `(uri, start, end)` indexes.
    pub fn ensure_indexes(&self) -> ChunkResult<()> {
        for spec in [IndexSpec::Uri, IndexSpec::UriRange] {
            self.documents
                .create_index(spec)
                .map_err(|e| ChunkError::store(StoreOperation::Adding, "", e))?;
        }
        Ok(())
    }

    /// Chunks of `uri` overlapping `range`, in index direction.
    ///
    /// `primary_mnemonic` restricts the result to chunks indexed by that
    /// channel. Returned chunks always carry their rows inline.
    pub fn get(
        &self,
        uri: &str,
        primary_mnemonic: Option<&str>,
        range: &Range<f64>,
        increasing: bool,
        limiter: FetchLimiter,
    ) -> ChunkResult<Vec<ChannelDataChunk>> {
        let filter = ChunkFilter {
            uri: uri.to_lowercase(),
            primary_mnemonic: primary_mnemonic.map(str::to_string),
            range: *range,
            increasing,
        };
        let sort = if increasing {
            ChunkSort::Ascending
        } else {
            ChunkSort::Descending
        };

        let found = self
            .documents
            .find(&filter, sort)
            .map_err(|e| ChunkError::store(StoreOperation::Reading, uri, e))?;
        let matched = found.len();
        let mut chunks = limiter.take(found, range, increasing);

        for chunk in &mut chunks {
            self.rehydrate(chunk)?;
        }

        debug!(
            uri = %uri,
            matched,
            returned = chunks.len(),
            "chunk_fetch"
        );
        Ok(chunks)
    }

    /// Rows of `uri` inside `range` as one reader; `None` when nothing is stored.
    pub fn get_reader(
        &self,
        uri: &str,
        primary_mnemonic: Option<&str>,
        range: &Range<f64>,
        increasing: bool,
        limiter: FetchLimiter,
    ) -> ChunkResult<Option<ChannelDataReader>> {
        let chunks = self.get(uri, primary_mnemonic, range, increasing, limiter)?;
        if chunks.iter().all(ChannelDataChunk::is_delete_marker) {
            return Ok(None);
        }
        let mut reader = ChannelDataReader::from_chunks(&chunks)?;
        reader.retain_range(range)?;
        Ok(Some(reader))
    }

    /// Insert, update or delete each chunk according to its uid and rows.
    ///
    /// Inserted uids are recorded in `tx`. Before-images of updated or
    /// deleted chunks must already be attached by the caller.
    pub fn bulk_write(
        &self,
        uri: &str,
        chunks: Vec<ChannelDataChunk>,
        mut tx: Option<&mut Transaction>,
    ) -> ChunkResult<BulkWriteSummary> {
        let mut summary = BulkWriteSummary::default();
        let mut ops = Vec::with_capacity(chunks.len());
        let mut uploads = Vec::new();
        let mut blob_deletes = Vec::new();

        for mut chunk in chunks {
            if chunk.is_delete_marker() {
                if !chunk.is_new() {
                    blob_deletes.push(chunk.uid.clone());
                    ops.push(WriteOp::Delete { uid: chunk.uid });
                    summary.deleted += 1;
                }
                continue;
            }

            let inserting = chunk.is_new();
            if inserting {
                chunk.uid = Uuid::new_v4().to_string();
                if let Some(tx) = tx.as_deref_mut() {
                    tx.attach(CHUNK_COLLECTION, &chunk.uid, uri, None);
                }
            }

            match self.externalize(&mut chunk)? {
                Some(bytes) => {
                    uploads.push((chunk.uid.clone(), bytes));
                    summary.externalized += 1;
                }
                // rows moved back inline: an older blob may exist
                None if !inserting => blob_deletes.push(chunk.uid.clone()),
                None => {}
            }

            if inserting {
                ops.push(WriteOp::Insert(chunk));
                summary.inserted += 1;
            } else {
                ops.push(WriteOp::Update(chunk));
                summary.updated += 1;
            }
        }

        let operation = if summary.updated == 0 && summary.deleted == 0 {
            StoreOperation::Adding
        } else {
            StoreOperation::Updating
        };

        for (uid, bytes) in &uploads {
            self.blobs
                .upload(uid, bytes)
                .map_err(|e| ChunkError::store(operation, uri, e))?;
        }
        if !ops.is_empty() {
            self.documents
                .bulk_write(ops)
                .map_err(|e| ChunkError::store(operation, uri, e))?;
        }
        for uid in &blob_deletes {
            self.blobs
                .delete(uid)
                .map_err(|e| ChunkError::store(StoreOperation::Deleting, uri, e))?;
        }

        info!(
            uri = %uri,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            externalized = summary.externalized,
            "chunk_bulk_write"
        );
        Ok(summary)
    }

    /// Delete every chunk of `uri` and their blobs. Returns the chunk count.
    pub fn delete(&self, uri: &str) -> ChunkResult<usize> {
        let uids = self
            .documents
            .delete_many(uri)
            .map_err(|e| ChunkError::store(StoreOperation::Deleting, uri, e))?;
        for uid in &uids {
            self.blobs
                .delete(uid)
                .map_err(|e| ChunkError::store(StoreOperation::Deleting, uri, e))?;
        }
        info!(uri = %uri, deleted = uids.len(), "chunk_delete_all");
        Ok(uids.len())
    }

    /// Put a chunk back as it was: upsert `before`, or remove `uid` when
    /// there was nothing before.
    pub fn restore(&self, uri: &str, uid: &str, before: Option<ChannelDataChunk>) -> ChunkResult<()> {
        let err = |e: StoreError| ChunkError::store(StoreOperation::Updating, uri, e);
        match before {
            Some(mut chunk) => {
                match self.externalize(&mut chunk)? {
                    Some(bytes) => self.blobs.upload(&chunk.uid, &bytes).map_err(err)?,
                    None => self.blobs.delete(&chunk.uid).map_err(err)?,
                }
                self.documents.bulk_write(vec![WriteOp::Upsert(chunk)]).map_err(err)?;
            }
            None => {
                self.documents
                    .bulk_write(vec![WriteOp::Delete { uid: uid.to_string() }])
                    .map_err(err)?;
                self.blobs.delete(uid).map_err(err)?;
            }
        }
        Ok(())
    }

    /// Move `data` out of the document when it is over the inline
    /// threshold, then check the document size.
    fn externalize(&self, chunk: &mut ChannelDataChunk) -> ChunkResult<Option<Vec<u8>>> {
        let mut moved = None;
        if chunk.data.len() > self.config.inline_data_size_threshold {
            moved = Some(std::mem::take(&mut chunk.data).into_bytes());
        }

        let size = serde_json::to_vec(&*chunk)?.len();
        if size > self.config.max_document_size {
            return Err(ChunkError::Capacity {
                uid: chunk.uid.clone(),
                size,
                limit: self.config.max_document_size,
            });
        }
        Ok(moved)
    }

    fn rehydrate(&self, chunk: &mut ChannelDataChunk) -> ChunkResult<()> {
        if !chunk.is_externalized() {
            return Ok(());
        }
        let bytes = self
            .blobs
            .download(&chunk.uid)
            .map_err(|e| ChunkError::store(StoreOperation::Reading, chunk.uri.clone(), e))?;
        chunk.data = String::from_utf8(bytes).map_err(|e| {
            ChunkError::InvalidData(format!("chunk '{}' blob is not UTF-8: {e}", chunk.uid))
        })?;
        Ok(())
    }
}

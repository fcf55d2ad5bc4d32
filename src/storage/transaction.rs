//! Transaction - undo log for chunk writes
//!
//! Records a before-image for every chunk a write touches so the caller
//! can put the store back. Nothing is buffered: writes go straight to the
//! backends and `rollback` replays the log newest-first.

use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::{BlobStore, ChunkStoreAdapter, DocumentStore};
use crate::channel::ChannelDataChunk;
use crate::error::ChunkResult;

/// One touched document.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEntry {
    pub collection: String,
    pub key: String,
    pub uri: String,
    /// `None` when the write created the document
    pub before_image: Option<ChannelDataChunk>,
}

/// Undo log scoped to one logical operation.
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    entries: Vec<TransactionEntry>,
    keys: HashSet<(String, String)>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            id: Uuid::new_v4(),
            entries: Vec::new(),
            keys: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Record the state of `key` before it is written.
    ///
    /// Only the first attach per key counts: later writes to the same
    /// document must not replace the original image.
    pub fn attach(
        &mut self,
        collection: &str,
        key: &str,
        uri: &str,
        before_image: Option<ChannelDataChunk>,
    ) -> bool {
        if !self.keys.insert((collection.to_string(), key.to_string())) {
            return false;
        }
        self.entries.push(TransactionEntry {
            collection: collection.to_string(),
            key: key.to_string(),
            uri: uri.to_string(),
            before_image,
        });
        true
    }

    pub fn entries(&self) -> &[TransactionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep the writes and drop the log.
    pub fn commit(self) {
        info!(transaction = %self.id, entries = self.entries.len(), "transaction_commit");
    }

    /// Undo every recorded write, newest first. Returns the entry count.
    pub fn rollback<D: DocumentStore, B: BlobStore>(
        self,
        adapter: &ChunkStoreAdapter<D, B>,
    ) -> ChunkResult<usize> {
        let count = self.entries.len();
        for entry in self.entries.into_iter().rev() {
            if let Err(e) = adapter.restore(&entry.uri, &entry.key, entry.before_image) {
                warn!(transaction = %self.id, key = %entry.key, error = %e, "transaction_rollback_failed");
                return Err(e);
            }
        }
        info!(transaction = %self.id, entries = count, "transaction_rollback");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBlobStore, MemoryDocumentStore, WriteOp, CHUNK_COLLECTION};
    use crate::config::StoreConfig;
    use crate::channel::ChannelIndexInfo;
    use serde_json::json;

    fn chunk(uid: &str, value: i64) -> ChannelDataChunk {
        let mut index = ChannelIndexInfo::depth("MD", "m", true);
        index.start = Some(0.0);
        index.end = Some(0.0);
        let mut chunk = ChannelDataChunk {
            uid: uid.to_string(),
            uri: "u".to_string(),
            indices: vec![index],
            ..ChannelDataChunk::default()
        };
        chunk.set_columns(&["MD".into(), "A".into()], &["m".into(), "".into()], &["".into(), "-1".into()]);
        chunk.set_rows(&[vec![json!(0), json!(value)]]).unwrap();
        chunk
    }

    #[test]
    fn test_first_attach_wins() {
        let mut tx = Transaction::new();
        assert!(tx.attach(CHUNK_COLLECTION, "a", "u", Some(chunk("a", 1))));
        assert!(!tx.attach(CHUNK_COLLECTION, "a", "u", Some(chunk("a", 2))));
        assert_eq!(tx.len(), 1);
        assert_eq!(tx.entries()[0].before_image, Some(chunk("a", 1)));
    }

    #[test]
    fn test_rollback_restores_and_removes() {
        let adapter = ChunkStoreAdapter::new(
            MemoryDocumentStore::new(),
            MemoryBlobStore::new(),
            StoreConfig::default(),
        );
        let docs = adapter.documents().clone();
        docs.bulk_write(vec![WriteOp::Insert(chunk("a", 1))]).unwrap();

        let mut tx = Transaction::new();
        tx.attach(CHUNK_COLLECTION, "a", "u", Some(chunk("a", 1)));
        docs.bulk_write(vec![WriteOp::Update(chunk("a", 2))]).unwrap();
        tx.attach(CHUNK_COLLECTION, "b", "u", None);
        docs.bulk_write(vec![WriteOp::Insert(chunk("b", 3))]).unwrap();

        assert_eq!(tx.rollback(&adapter).unwrap(), 2);
        assert_eq!(docs.get("a"), Some(chunk("a", 1)));
        assert!(docs.get("b").is_none());
    }
}

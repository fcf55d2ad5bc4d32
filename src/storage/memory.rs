//! In-memory document and blob backends.
//!
//! Uses `parking_lot::RwLock` (no poisoning). Both stores are cheap to
//! clone handles onto the same data.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::{BlobStore, ChunkFilter, ChunkSort, DocumentStore, IndexSpec, StoreError, StoreResult, WriteOp};
use crate::channel::ChannelDataChunk;

/// Chunk documents keyed by uid.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    chunks: Arc<RwLock<BTreeMap<String, ChannelDataChunk>>>,
    indexes: Arc<RwLock<HashSet<IndexSpec>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<ChannelDataChunk> {
        self.chunks.read().get(uid).cloned()
    }

    pub fn has_index(&self, spec: IndexSpec) -> bool {
        self.indexes.read().contains(&spec)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn find(&self, filter: &ChunkFilter, sort: ChunkSort) -> StoreResult<Vec<ChannelDataChunk>> {
        let mut found: Vec<ChannelDataChunk> = self
            .chunks
            .read()
            .values()
            .filter(|chunk| filter.matches(chunk))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            let a = a.range().start.unwrap_or(f64::NEG_INFINITY);
            let b = b.range().start.unwrap_or(f64::NEG_INFINITY);
            match sort {
                ChunkSort::Ascending => a.total_cmp(&b),
                ChunkSort::Descending => b.total_cmp(&a),
            }
        });
        Ok(found)
    }

    fn bulk_write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut chunks = self.chunks.write();
        for op in ops {
            match op {
                WriteOp::Insert(chunk) => {
                    if chunks.contains_key(&chunk.uid) {
                        return Err(StoreError::DuplicateKey(chunk.uid));
                    }
                    chunks.insert(chunk.uid.clone(), chunk);
                }
                WriteOp::Update(chunk) => {
                    let Some(slot) = chunks.get_mut(&chunk.uid) else {
                        return Err(StoreError::NotFound(chunk.uid));
                    };
                    *slot = chunk;
                }
                WriteOp::Upsert(chunk) => {
                    chunks.insert(chunk.uid.clone(), chunk);
                }
                WriteOp::Delete { uid } => {
                    chunks.remove(&uid);
                }
            }
        }
        Ok(())
    }

    fn delete_many(&self, uri: &str) -> StoreResult<Vec<String>> {
        let mut chunks = self.chunks.write();
        let uids: Vec<String> = chunks
            .values()
            .filter(|chunk| chunk.uri.eq_ignore_ascii_case(uri))
            .map(|chunk| chunk.uid.clone())
            .collect();
        for uid in &uids {
            chunks.remove(uid);
        }
        Ok(uids)
    }

    fn create_index(&self, spec: IndexSpec) -> StoreResult<()> {
        self.indexes.write().insert(spec);
        Ok(())
    }
}

/// Blobs keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blobs.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.blobs.write().insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn download(&self, id: &str) -> StoreResult<Vec<u8>> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.blobs.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelIndexInfo;
    use crate::range::Range;

    fn chunk(uid: &str, start: f64) -> ChannelDataChunk {
        let mut index = ChannelIndexInfo::depth("MD", "m", true);
        index.start = Some(start);
        index.end = Some(start + 1.0);
        ChannelDataChunk {
            uid: uid.to_string(),
            uri: "u".to_string(),
            indices: vec![index],
            record_count: 2,
            ..ChannelDataChunk::default()
        }
    }

    #[test]
    fn test_bulk_write_and_find_sorted() {
        let store = MemoryDocumentStore::new();
        store
            .bulk_write(vec![
                WriteOp::Insert(chunk("b", 10.0)),
                WriteOp::Insert(chunk("a", 0.0)),
                WriteOp::Insert(chunk("c", 5.0)),
            ])
            .unwrap();

        let asc = store.find(&ChunkFilter::for_uri("u"), ChunkSort::Ascending).unwrap();
        let uids: Vec<_> = asc.iter().map(|c| c.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "c", "b"]);

        let mut filter = ChunkFilter::for_uri("u");
        filter.range = Range::bounded(4.0, 7.0);
        let desc = store.find(&filter, ChunkSort::Descending).unwrap();
        assert_eq!(desc.len(), 1);
        assert_eq!(desc[0].uid, "c");
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let store = MemoryDocumentStore::new();
        store.bulk_write(vec![WriteOp::Insert(chunk("a", 0.0))]).unwrap();
        let err = store.bulk_write(vec![WriteOp::Insert(chunk("a", 0.0))]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[test]
    fn test_update_missing_fails() {
        let store = MemoryDocumentStore::new();
        let err = store.bulk_write(vec![WriteOp::Update(chunk("a", 0.0))]).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_many() {
        let store = MemoryDocumentStore::new();
        store
            .bulk_write(vec![WriteOp::Insert(chunk("a", 0.0)), WriteOp::Upsert(chunk("b", 2.0))])
            .unwrap();
        let mut deleted = store.delete_many("U").unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["a", "b"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_blob_roundtrip() {
        let blobs = MemoryBlobStore::new();
        blobs.upload("x", b"payload").unwrap();
        assert_eq!(blobs.download("x").unwrap(), b"payload");
        blobs.delete("x").unwrap();
        blobs.delete("x").unwrap();
        assert!(matches!(blobs.download("x"), Err(StoreError::NotFound(_))));
    }
}

//! File-backed blob store.
//!
//! Each blob is split into fixed-size segments written as
//! `{id}.{n}.seg`, plus a JSON manifest `{id}.manifest.json` holding the
//! total length and a CRC32 per segment. The manifest is written last,
//! so a blob without one does not exist.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{BlobStore, StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobManifest {
    id: String,
    length: usize,
    chunk_size: usize,
    checksums: Vec<u32>,
    uploaded_at: String,
}

/// Blob store writing segmented files under one directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
    chunk_size: usize,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: usize) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileBlobStore {
            dir,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.manifest.json"))
    }

    fn segment_path(&self, id: &str, n: usize) -> PathBuf {
        self.dir.join(format!("{id}.{n}.seg"))
    }

    fn read_manifest(&self, id: &str) -> StoreResult<Option<BlobManifest>> {
        let path = self.manifest_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        Ok(Some(serde_json::from_reader(file)?))
    }

    fn remove_segments(&self, id: &str, count: usize) -> StoreResult<()> {
        for n in 0..count {
            let path = self.segment_path(id, n);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn check_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(StoreError::Backend(format!("invalid blob id '{id}'")));
    }
    Ok(())
}

impl BlobStore for FileBlobStore {
    fn upload(&self, id: &str, bytes: &[u8]) -> StoreResult<()> {
        check_id(id)?;
        // Replacing a blob: drop the old manifest first so a failed upload
        // leaves no half-valid blob behind.
        if let Some(old) = self.read_manifest(id)? {
            fs::remove_file(self.manifest_path(id))?;
            self.remove_segments(id, old.checksums.len())?;
        }

        let mut checksums = Vec::new();
        for (n, segment) in bytes.chunks(self.chunk_size).enumerate() {
            let mut file = File::create(self.segment_path(id, n))?;
            file.write_all(segment)?;
            file.sync_all()?;
            checksums.push(crc32fast::hash(segment));
        }

        let manifest = BlobManifest {
            id: id.to_string(),
            length: bytes.len(),
            chunk_size: self.chunk_size,
            checksums,
            uploaded_at: Utc::now().to_rfc3339(),
        };
        let file = File::create(self.manifest_path(id))?;
        serde_json::to_writer_pretty(&file, &manifest)?;
        file.sync_all()?;
        Ok(())
    }

    fn download(&self, id: &str) -> StoreResult<Vec<u8>> {
        check_id(id)?;
        let manifest = self
            .read_manifest(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut bytes = Vec::with_capacity(manifest.length);
        for (n, expected) in manifest.checksums.iter().enumerate() {
            let segment = fs::read(self.segment_path(id, n))?;
            if crc32fast::hash(&segment) != *expected {
                return Err(StoreError::ChecksumMismatch {
                    id: id.to_string(),
                    segment: n,
                });
            }
            bytes.extend_from_slice(&segment);
        }

        if bytes.len() != manifest.length {
            return Err(StoreError::Backend(format!(
                "blob '{id}' is {} bytes, manifest says {}",
                bytes.len(),
                manifest.length
            )));
        }
        Ok(bytes)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        check_id(id)?;
        let Some(manifest) = self.read_manifest(id)? else {
            return Ok(());
        };
        fs::remove_file(self.manifest_path(id))?;
        self.remove_segments(id, manifest.checksums.len())
    }
}

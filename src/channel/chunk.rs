//! The persisted chunk document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::index::ChannelIndexInfo;
use crate::error::{ChunkError, ChunkResult};
use crate::range::Range;

/// One bounded index range of a log's channel data.
///
/// `mnemonic_list`, `unit_list` and `null_value_list` are comma-joined,
/// index columns first, in row column order. `data` holds the rows as a
/// JSON array of arrays; it is empty while the rows live in the blob
/// store under `uid`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDataChunk {
    pub uid: String,
    pub uri: String,
    pub mnemonic_list: String,
    pub unit_list: String,
    pub null_value_list: String,
    pub indices: Vec<ChannelIndexInfo>,
    pub data: String,
    pub record_count: usize,
}

impl ChannelDataChunk {
    /// A marker telling the store to drop the chunk with this uid.
    pub fn delete_marker(uid: &str, uri: &str) -> Self {
        ChannelDataChunk {
            uid: uid.to_string(),
            uri: uri.to_string(),
            ..ChannelDataChunk::default()
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        self.indices.is_empty() || self.record_count == 0
    }

    /// Not yet persisted.
    pub fn is_new(&self) -> bool {
        self.uid.is_empty()
    }

    /// Rows were moved to the blob store.
    pub fn is_externalized(&self) -> bool {
        self.data.is_empty() && self.record_count > 0
    }

    pub fn primary_index(&self) -> Option<&ChannelIndexInfo> {
        self.indices.first()
    }

    pub fn increasing(&self) -> bool {
        self.primary_index().map_or(true, |index| index.increasing)
    }

    /// Declared primary index range; unbounded for delete markers.
    pub fn range(&self) -> Range<f64> {
        self.primary_index()
            .map(ChannelIndexInfo::range)
            .unwrap_or_default()
    }

    pub fn mnemonics(&self) -> Vec<String> {
        split_list(&self.mnemonic_list)
    }

    pub fn units(&self) -> Vec<String> {
        split_list(&self.unit_list)
    }

    pub fn null_values(&self) -> Vec<String> {
        split_list(&self.null_value_list)
    }

    /// Channel mnemonics without the index columns.
    pub fn channel_mnemonics(&self) -> Vec<String> {
        self.mnemonics().into_iter().skip(self.indices.len()).collect()
    }

    /// Decode `data`. Externalized chunks must be rehydrated first.
    pub fn rows(&self) -> ChunkResult<Vec<Vec<Value>>> {
        if self.data.is_empty() {
            if self.record_count > 0 {
                return Err(ChunkError::InvalidData(format!(
                    "chunk '{}' data has not been rehydrated",
                    self.uid
                )));
            }
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.data)?)
    }

    /// Replace `data` and `record_count`.
    pub fn set_rows(&mut self, rows: &[Vec<Value>]) -> ChunkResult<()> {
        self.data = serde_json::to_string(rows)?;
        self.record_count = rows.len();
        Ok(())
    }

    pub fn set_columns(&mut self, mnemonics: &[String], units: &[String], null_values: &[String]) {
        self.mnemonic_list = mnemonics.join(",");
        self.unit_list = units.join(",");
        self.null_value_list = null_values.join(",");
    }
}

fn split_list(list: &str) -> Vec<String> {
    if list.is_empty() {
        return Vec::new();
    }
    list.split(',').map(|s| s.trim().to_string()).collect()
}

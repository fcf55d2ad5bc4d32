//! Row-oriented view over channel data.
//!
//! Every row holds the index cells first (primary index at ordinal 0)
//! followed by one cell per channel. Cells matching a channel's declared
//! null value are normalized to JSON `null` on the way in, so the rest of
//! the engine only ever checks `Value::is_null`.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::chunk::ChannelDataChunk;
use super::index::{ChannelIndexInfo, IndexValue};
use crate::error::{ChunkError, ChunkResult};
use crate::range::{is_before, Range};

/// Column layout: index channels, then data channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLayout {
    uri: String,
    indices: Vec<ChannelIndexInfo>,
    mnemonics: Vec<String>,
    units: Vec<String>,
    null_values: Vec<String>,
}

impl ChannelLayout {
    /// `units` and `null_values` may be empty, in which case they are
    /// filled with empty strings.
    pub fn new(
        uri: &str,
        indices: Vec<ChannelIndexInfo>,
        mnemonics: Vec<String>,
        mut units: Vec<String>,
        mut null_values: Vec<String>,
    ) -> ChunkResult<Self> {
        if indices.is_empty() {
            return Err(ChunkError::InvalidData(format!(
                "'{uri}' has no index channel"
            )));
        }
        if units.is_empty() {
            units = vec![String::new(); mnemonics.len()];
        }
        if null_values.is_empty() {
            null_values = vec![String::new(); mnemonics.len()];
        }
        if units.len() != mnemonics.len() || null_values.len() != mnemonics.len() {
            return Err(ChunkError::InvalidData(format!(
                "'{uri}' has {} mnemonics, {} units and {} null values",
                mnemonics.len(),
                units.len(),
                null_values.len()
            )));
        }

        Ok(ChannelLayout {
            uri: uri.to_lowercase(),
            indices,
            mnemonics,
            units,
            null_values,
        })
    }

    /// Layout recorded in a stored chunk.
    pub fn from_chunk(chunk: &ChannelDataChunk) -> ChunkResult<Self> {
        let index_count = chunk.indices.len();
        let mnemonics = chunk.mnemonics();
        let mut units = chunk.units();
        let mut null_values = chunk.null_values();
        if mnemonics.len() < index_count {
            return Err(ChunkError::InvalidData(format!(
                "chunk '{}' lists fewer mnemonics than indices",
                chunk.uid
            )));
        }
        units.resize(mnemonics.len(), String::new());
        null_values.resize(mnemonics.len(), String::new());

        ChannelLayout::new(
            &chunk.uri,
            chunk.indices.clone(),
            mnemonics[index_count..].to_vec(),
            units[index_count..].to_vec(),
            null_values[index_count..].to_vec(),
        )
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn indices(&self) -> &[ChannelIndexInfo] {
        &self.indices
    }

    pub fn primary_index(&self) -> &ChannelIndexInfo {
        &self.indices[0]
    }

    pub fn increasing(&self) -> bool {
        self.primary_index().increasing
    }

    /// Data channel mnemonics, without index channels.
    pub fn mnemonics(&self) -> &[String] {
        &self.mnemonics
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn null_values(&self) -> &[String] {
        &self.null_values
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn column_count(&self) -> usize {
        self.indices.len() + self.mnemonics.len()
    }

    /// Column ordinal of an index or channel mnemonic (case-insensitive).
    pub fn ordinal_of(&self, mnemonic: &str) -> Option<usize> {
        self.indices
            .iter()
            .map(|index| index.mnemonic.as_str())
            .chain(self.mnemonics.iter().map(String::as_str))
            .position(|m| m.eq_ignore_ascii_case(mnemonic))
    }

    pub fn all_mnemonics(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|index| index.mnemonic.clone())
            .chain(self.mnemonics.iter().cloned())
            .collect()
    }

    pub fn all_units(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|index| index.unit.clone())
            .chain(self.units.iter().cloned())
            .collect()
    }

    /// Index columns have no null value.
    pub fn all_null_values(&self) -> Vec<String> {
        std::iter::repeat_n(String::new(), self.indices.len())
            .chain(self.null_values.iter().cloned())
            .collect()
    }

    /// Append a channel unless one with the same mnemonic exists.
    pub fn add_channel(&mut self, mnemonic: &str, unit: &str, null_value: &str) -> bool {
        if self.ordinal_of(mnemonic).is_some() {
            return false;
        }
        self.mnemonics.push(mnemonic.to_string());
        self.units.push(unit.to_string());
        self.null_values.push(null_value.to_string());
        true
    }

    /// Same index and channel mnemonics, in any order.
    pub fn has_same_mnemonics(&self, other: &ChannelLayout) -> bool {
        let lower = |layout: &ChannelLayout| -> HashSet<String> {
            layout
                .all_mnemonics()
                .iter()
                .map(|m| m.to_lowercase())
                .collect()
        };
        self.column_count() == other.column_count() && lower(self) == lower(other)
    }

    /// For each column of `self`, its ordinal in `source`.
    pub fn mapping_from(&self, source: &ChannelLayout) -> Vec<Option<usize>> {
        self.all_mnemonics()
            .iter()
            .enumerate()
            .map(|(ordinal, mnemonic)| {
                if ordinal < self.index_count() {
                    (ordinal < source.index_count()).then_some(ordinal)
                } else {
                    source.ordinal_of(mnemonic)
                }
            })
            .collect()
    }

    fn is_null_cell(&self, ordinal: usize, cell: &Value) -> bool {
        if cell.is_null() {
            return true;
        }
        let Some(null_value) = ordinal
            .checked_sub(self.indices.len())
            .and_then(|channel| self.null_values.get(channel))
        else {
            return false;
        };
        if null_value.is_empty() {
            return false;
        }
        match cell {
            Value::String(s) => s == null_value,
            Value::Number(n) => null_value
                .parse::<f64>()
                .ok()
                .zip(n.as_f64())
                .is_some_and(|(a, b)| a == b),
            _ => false,
        }
    }
}

/// One row of channel data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    values: Vec<Value>,
    index_count: usize,
    source: Option<String>,
}

impl ChannelRecord {
    pub fn new(values: Vec<Value>, index_count: usize) -> Self {
        ChannelRecord {
            values,
            index_count,
            source: None,
        }
    }

    /// Tag the record with the uid of the chunk it was read from.
    pub fn with_source(mut self, uid: &str) -> Self {
        self.source = (!uid.is_empty()).then(|| uid.to_string());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    pub fn value(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    pub fn index_value(&self, primary: &ChannelIndexInfo) -> ChunkResult<IndexValue> {
        primary.parse_value(self.values.first().unwrap_or(&Value::Null))
    }

    /// Primary index as a plain number.
    pub fn index(&self, primary: &ChannelIndexInfo) -> ChunkResult<f64> {
        self.index_value(primary).map(IndexValue::as_f64)
    }

    pub fn to_json_row(&self) -> Value {
        Value::Array(self.values.clone())
    }

    pub fn into_row(self) -> Vec<Value> {
        self.values
    }

    /// At least one channel cell is non-null.
    pub fn has_channel_values(&self) -> bool {
        self.values
            .iter()
            .skip(self.index_count)
            .any(|cell| !cell.is_null())
    }

    /// Re-lay the record out per `mapping` (see `ChannelLayout::mapping_from`).
    pub fn remap(&self, mapping: &[Option<usize>], index_count: usize) -> ChannelRecord {
        let values = mapping
            .iter()
            .map(|ordinal| {
                ordinal
                    .and_then(|o| self.values.get(o).cloned())
                    .unwrap_or(Value::Null)
            })
            .collect();
        ChannelRecord {
            values,
            index_count,
            source: self.source.clone(),
        }
    }
}

/// Channel data for one parent object: a layout and its rows.
#[derive(Debug, Clone)]
pub struct ChannelDataReader {
    layout: ChannelLayout,
    records: Vec<ChannelRecord>,
}

impl ChannelDataReader {
    pub fn new(layout: ChannelLayout, rows: Vec<Vec<Value>>) -> ChunkResult<Self> {
        let records = rows
            .into_iter()
            .map(|row| normalize_row(&layout, row).map(|row| ChannelRecord::new(row, layout.index_count())))
            .collect::<ChunkResult<Vec<_>>>()?;
        Ok(ChannelDataReader { layout, records })
    }

    /// Reader over stored chunks, in the order given.
    ///
    /// Chunks of one log may carry different channel sets (e.g. after a
    /// partial delete); the reader's layout is their union in order of
    /// first appearance. Records remember the uid of their chunk.
    pub fn from_chunks(chunks: &[ChannelDataChunk]) -> ChunkResult<Self> {
        let Some(first) = chunks.iter().find(|chunk| !chunk.is_delete_marker()) else {
            return Err(ChunkError::InvalidData(
                "no chunks to read channel data from".to_string(),
            ));
        };

        let mut layout = ChannelLayout::from_chunk(first)?;
        let mut chunk_layouts = Vec::with_capacity(chunks.len());
        for chunk in chunks.iter().filter(|chunk| !chunk.is_delete_marker()) {
            let chunk_layout = ChannelLayout::from_chunk(chunk)?;
            if chunk_layout.index_count() != layout.index_count() {
                return Err(ChunkError::InvalidData(format!(
                    "chunk '{}' has {} indices, expected {}",
                    chunk.uid,
                    chunk_layout.index_count(),
                    layout.index_count()
                )));
            }
            for (i, mnemonic) in chunk_layout.mnemonics().iter().enumerate() {
                layout.add_channel(
                    mnemonic,
                    &chunk_layout.units()[i],
                    &chunk_layout.null_values()[i],
                );
            }
            chunk_layouts.push((chunk, chunk_layout));
        }

        let mut records = Vec::new();
        for (chunk, chunk_layout) in chunk_layouts {
            let mapping = layout.mapping_from(&chunk_layout);
            for row in chunk.rows()? {
                let row = normalize_row(&chunk_layout, row)?;
                let record = ChannelRecord::new(row, chunk_layout.index_count())
                    .with_source(&chunk.uid)
                    .remap(&mapping, layout.index_count());
                records.push(record);
            }
        }

        Ok(ChannelDataReader { layout, records })
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn uri(&self) -> &str {
        self.layout.uri()
    }

    pub fn indices(&self) -> &[ChannelIndexInfo] {
        self.layout.indices()
    }

    pub fn primary_index(&self) -> &ChannelIndexInfo {
        self.layout.primary_index()
    }

    pub fn increasing(&self) -> bool {
        self.layout.increasing()
    }

    pub fn mnemonics(&self) -> &[String] {
        self.layout.mnemonics()
    }

    pub fn units(&self) -> &[String] {
        self.layout.units()
    }

    pub fn null_values(&self) -> &[String] {
        self.layout.null_values()
    }

    pub fn ordinal_of(&self, mnemonic: &str) -> Option<usize> {
        self.layout.ordinal_of(mnemonic)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ChannelRecord> + '_ {
        self.records.iter()
    }

    pub fn into_parts(self) -> (ChannelLayout, Vec<ChannelRecord>) {
        (self.layout, self.records)
    }

    /// Primary index of the first and last record.
    pub fn index_range(&self) -> ChunkResult<Range<f64>> {
        let primary = self.primary_index();
        let start = self.records.first().map(|r| r.index(primary)).transpose()?;
        let end = self.records.last().map(|r| r.index(primary)).transpose()?;
        Ok(Range::new(start, end))
    }

    /// Per channel, the first and last index holding a non-null value.
    pub fn channel_ranges(&self) -> ChunkResult<HashMap<String, Range<f64>>> {
        let primary = self.primary_index();
        let offset = self.layout.index_count();
        let mut ranges: HashMap<String, Range<f64>> = HashMap::new();

        for record in &self.records {
            let index = record.index(primary)?;
            for (i, mnemonic) in self.layout.mnemonics().iter().enumerate() {
                if record.value(offset + i).is_some_and(|cell| !cell.is_null()) {
                    let range = ranges.entry(mnemonic.clone()).or_default();
                    if range.start.is_none() {
                        range.start = Some(index);
                    }
                    range.end = Some(index);
                }
            }
        }

        Ok(ranges)
    }

    /// Stable sort by primary index in the layout's direction.
    pub fn sort(&mut self) -> ChunkResult<()> {
        let primary = self.layout.primary_index().clone();
        let mut keyed = std::mem::take(&mut self.records)
            .into_iter()
            .map(|record| record.index(&primary).map(|index| (index, record)))
            .collect::<ChunkResult<Vec<_>>>()?;

        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.total_cmp(b);
            if primary.increasing {
                ordering
            } else {
                ordering.reverse()
            }
        });

        self.records = keyed.into_iter().map(|(_, record)| record).collect();
        Ok(())
    }

    /// Keep only records whose primary index lies inside `range`.
    pub fn retain_range(&mut self, range: &Range<f64>) -> ChunkResult<()> {
        let primary = self.layout.primary_index().clone();
        let mut kept = Vec::with_capacity(self.records.len());
        for record in std::mem::take(&mut self.records) {
            if range.contains(record.index(&primary)?, primary.increasing) {
                kept.push(record);
            }
        }
        self.records = kept;
        Ok(())
    }

    /// `a` sorts strictly before `b`.
    pub fn is_before(&self, a: f64, b: f64) -> bool {
        is_before(a, b, self.increasing())
    }
}

fn normalize_row(layout: &ChannelLayout, mut row: Vec<Value>) -> ChunkResult<Vec<Value>> {
    if row.len() != layout.column_count() {
        return Err(ChunkError::InvalidData(format!(
            "row has {} cells, '{}' declares {} columns",
            row.len(),
            layout.uri(),
            layout.column_count()
        )));
    }
    for (ordinal, cell) in row.iter_mut().enumerate().skip(layout.index_count()) {
        if layout.is_null_cell(ordinal, cell) {
            *cell = Value::Null;
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout(channels: &[&str]) -> ChannelLayout {
        ChannelLayout::new(
            "EML://Log(1)",
            vec![ChannelIndexInfo::depth("MD", "m", true)],
            channels.iter().map(|c| (*c).to_string()).collect(),
            Vec::new(),
            channels.iter().map(|_| "-999.25".to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_layout_basics() {
        let layout = layout(&["GR", "ROP"]);
        assert_eq!(layout.uri(), "eml://log(1)");
        assert_eq!(layout.column_count(), 3);
        assert_eq!(layout.ordinal_of("rop"), Some(2));
        assert_eq!(layout.ordinal_of("md"), Some(0));
        assert_eq!(layout.all_mnemonics(), vec!["MD", "GR", "ROP"]);
        assert_eq!(layout.all_null_values(), vec!["", "-999.25", "-999.25"]);
    }

    #[test]
    fn test_layout_requires_index() {
        let err = ChannelLayout::new("u", Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert!(err.is_err());
    }

    #[test]
    fn test_null_values_are_normalized() {
        let reader = ChannelDataReader::new(
            layout(&["GR", "ROP"]),
            vec![vec![json!(1.0), json!(-999.25), json!("-999.25")]],
        )
        .unwrap();
        let record = reader.records().next().unwrap();
        assert_eq!(record.value(1), Some(&Value::Null));
        assert_eq!(record.value(2), Some(&Value::Null));
        assert!(!record.has_channel_values());
    }

    #[test]
    fn test_row_width_is_checked() {
        let result = ChannelDataReader::new(layout(&["GR"]), vec![vec![json!(1.0)]]);
        assert!(matches!(result, Err(ChunkError::InvalidData(_))));
    }

    #[test]
    fn test_sort_and_range() {
        let mut reader = ChannelDataReader::new(
            layout(&["GR"]),
            vec![
                vec![json!(3.0), json!(1)],
                vec![json!(1.0), json!(2)],
                vec![json!(2.0), json!(3)],
            ],
        )
        .unwrap();
        reader.sort().unwrap();
        assert_eq!(reader.index_range().unwrap(), Range::bounded(1.0, 3.0));

        reader.retain_range(&Range::bounded(2.0, 5.0)).unwrap();
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn test_channel_ranges() {
        let reader = ChannelDataReader::new(
            layout(&["GR", "ROP"]),
            vec![
                vec![json!(1.0), json!(1), Value::Null],
                vec![json!(2.0), json!(2), json!(5)],
                vec![json!(3.0), Value::Null, json!(6)],
            ],
        )
        .unwrap();
        let ranges = reader.channel_ranges().unwrap();
        assert_eq!(ranges["GR"], Range::bounded(1.0, 2.0));
        assert_eq!(ranges["ROP"], Range::bounded(2.0, 3.0));
    }

    #[test]
    fn test_mapping_and_remap() {
        let target = layout(&["GR", "ROP"]);
        let source = layout(&["ROP"]);
        let mapping = target.mapping_from(&source);
        assert_eq!(mapping, vec![Some(0), None, Some(1)]);

        let record = ChannelRecord::new(vec![json!(1.0), json!(9)], 1).with_source("c1");
        let remapped = record.remap(&mapping, 1);
        assert_eq!(remapped.values(), &[json!(1.0), Value::Null, json!(9)]);
        assert_eq!(remapped.source(), Some("c1"));
    }
}

//! Remove channels, or index ranges of channels, from stored chunks.
//!
//! Chunks the request does not touch are left alone, but their channel
//! ranges still feed `SurvivedRanges` so the parent log header can be
//! recomputed from a single pass over the chunks.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::channel::{ChannelDataChunk, ChannelDataReader, ChannelLayout};
use crate::error::ChunkResult;
use crate::range::Range;

/// What to delete. Mnemonics match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct PartialDeleteRequest {
    channels: HashSet<String>,
    ranges: HashMap<String, Range<f64>>,
}

impl PartialDeleteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete every value of `mnemonic`, and its column.
    pub fn channel(mut self, mnemonic: &str) -> Self {
        self.channels.insert(mnemonic.to_lowercase());
        self
    }

    /// Null out `mnemonic` inside `range` (inclusive).
    pub fn range(mut self, mnemonic: &str, range: Range<f64>) -> Self {
        self.ranges.insert(mnemonic.to_lowercase(), range);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.ranges.is_empty()
    }

    pub fn deletes_channel(&self, mnemonic: &str) -> bool {
        self.channels.contains(&mnemonic.to_lowercase())
    }

    pub fn range_for(&self, mnemonic: &str) -> Option<&Range<f64>> {
        self.ranges.get(&mnemonic.to_lowercase())
    }
}

/// Index ranges still holding data after a partial delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurvivedRanges {
    pub primary: Range<f64>,
    pub channels: HashMap<String, Range<f64>>,
}

impl SurvivedRanges {
    fn fold_primary(&mut self, range: &Range<f64>, increasing: bool) {
        self.primary.extend(range, increasing);
    }

    fn fold_channels(&mut self, ranges: HashMap<String, Range<f64>>, increasing: bool) {
        for (mnemonic, range) in ranges {
            self.channels
                .entry(mnemonic)
                .or_default()
                .extend(&range, increasing);
        }
    }

    pub fn channel(&self, mnemonic: &str) -> Option<&Range<f64>> {
        self.channels
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(mnemonic))
            .map(|(_, range)| range)
    }
}

/// How one chunk fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDeleteOutcome {
    Unchanged,
    Updated,
    Deleted,
}

/// Counts for a partial delete over many chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialDeleteSummary {
    pub unchanged: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Apply `request` to one chunk in place.
///
/// A chunk left without rows becomes a delete marker carrying its uid.
pub fn partial_delete_chunk(
    chunk: &mut ChannelDataChunk,
    request: &PartialDeleteRequest,
    survived: &mut SurvivedRanges,
) -> ChunkResult<ChunkDeleteOutcome> {
    if chunk.is_delete_marker() {
        return Ok(ChunkDeleteOutcome::Unchanged);
    }

    let layout = ChannelLayout::from_chunk(chunk)?;
    let increasing = layout.increasing();
    let reader = ChannelDataReader::from_chunks(std::slice::from_ref(chunk))?;
    let channel_ranges = reader.channel_ranges()?;

    let affected = layout.mnemonics().iter().any(|mnemonic| {
        if request.deletes_channel(mnemonic) {
            return true;
        }
        match (request.range_for(mnemonic), channel_ranges.get(mnemonic)) {
            (Some(delete), Some(existing)) => delete.overlaps(existing, increasing),
            _ => false,
        }
    });

    if !affected {
        survived.fold_primary(&chunk.range(), increasing);
        survived.fold_channels(channel_ranges, increasing);
        return Ok(ChunkDeleteOutcome::Unchanged);
    }

    let index_count = layout.index_count();
    let primary = layout.primary_index().clone();

    // Kept columns with the delete range (if any) of each.
    let mut kept: Vec<(usize, Option<Range<f64>>)> = (0..index_count).map(|o| (o, None)).collect();
    let mut mnemonics = Vec::new();
    let mut units = Vec::new();
    let mut null_values = Vec::new();
    for (i, mnemonic) in layout.mnemonics().iter().enumerate() {
        if request.deletes_channel(mnemonic) {
            continue;
        }
        kept.push((index_count + i, request.range_for(mnemonic).copied()));
        mnemonics.push(mnemonic.clone());
        units.push(layout.units()[i].clone());
        null_values.push(layout.null_values()[i].clone());
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(reader.len());
    for record in reader.records() {
        let index = record.index(&primary)?;
        let row: Vec<Value> = kept
            .iter()
            .map(|(ordinal, range)| {
                if range.is_some_and(|r| r.contains(index, increasing)) {
                    Value::Null
                } else {
                    record.value(*ordinal).cloned().unwrap_or(Value::Null)
                }
            })
            .collect();
        if row.iter().skip(index_count).any(|cell| !cell.is_null()) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        *chunk = ChannelDataChunk::delete_marker(&chunk.uid, &chunk.uri);
        return Ok(ChunkDeleteOutcome::Deleted);
    }

    let new_layout = ChannelLayout::new(
        layout.uri(),
        layout.indices().to_vec(),
        mnemonics,
        units,
        null_values,
    )?;
    let survivors = ChannelDataReader::new(new_layout.clone(), rows.clone())?;
    let range = survivors.index_range()?;

    chunk.indices[0].start = range.start;
    chunk.indices[0].end = range.end;
    chunk.set_columns(
        &new_layout.all_mnemonics(),
        &new_layout.all_units(),
        &new_layout.all_null_values(),
    );
    chunk.set_rows(&rows)?;

    survived.fold_primary(&range, increasing);
    survived.fold_channels(survivors.channel_ranges()?, increasing);
    Ok(ChunkDeleteOutcome::Updated)
}

/// Apply `request` to every chunk, returning the ones to write back.
///
/// Unchanged chunks are not returned. Deleted ones come back as markers.
pub fn partial_delete(
    chunks: Vec<ChannelDataChunk>,
    request: &PartialDeleteRequest,
    survived: &mut SurvivedRanges,
) -> ChunkResult<(Vec<ChannelDataChunk>, PartialDeleteSummary)> {
    let mut summary = PartialDeleteSummary::default();
    let mut changed = Vec::new();

    for mut chunk in chunks {
        match partial_delete_chunk(&mut chunk, request, survived)? {
            ChunkDeleteOutcome::Unchanged => summary.unchanged += 1,
            ChunkDeleteOutcome::Updated => {
                summary.updated += 1;
                changed.push(chunk);
            }
            ChunkDeleteOutcome::Deleted => {
                summary.deleted += 1;
                changed.push(chunk);
            }
        }
    }

    Ok((changed, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelIndexInfo;
    use crate::chunking::builder::build_chunks;
    use crate::config::ChunkingConfig;
    use crate::error::ChunkResult;
    use serde_json::json;

    fn chunks(rows: Vec<Vec<Value>>) -> Vec<ChannelDataChunk> {
        let layout = ChannelLayout::new(
            "eml://log(1)",
            vec![ChannelIndexInfo::depth("MD", "m", true)],
            vec!["A".to_string(), "B".to_string()],
            vec!["u1".to_string(), "u2".to_string()],
            vec!["-1".to_string(), "-2".to_string()],
        )
        .unwrap();
        let config = ChunkingConfig {
            depth_range_size: 5,
            ..ChunkingConfig::default()
        };
        build_chunks(ChannelDataReader::new(layout, rows).unwrap(), &config)
            .collect::<ChunkResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.uid = format!("c{i}");
                c
            })
            .collect()
    }

    #[test]
    fn test_delete_channel_rebuilds_lists() {
        let mut chunk = chunks(vec![
            vec![json!(1), json!(10), json!(20)],
            vec![json!(2), json!(11), Value::Null],
        ])
        .remove(0);
        let request = PartialDeleteRequest::new().channel("b");
        let mut survived = SurvivedRanges::default();

        let outcome = partial_delete_chunk(&mut chunk, &request, &mut survived).unwrap();
        assert_eq!(outcome, ChunkDeleteOutcome::Updated);
        assert_eq!(chunk.mnemonic_list, "MD,A");
        assert_eq!(chunk.unit_list, "m,u1");
        assert_eq!(chunk.null_value_list, ",-1");
        assert_eq!(
            chunk.rows().unwrap(),
            vec![vec![json!(1), json!(10)], vec![json!(2), json!(11)]]
        );
        assert!(survived.channel("B").is_none());
        assert_eq!(survived.channel("a"), Some(&Range::bounded(1.0, 2.0)));
    }

    #[test]
    fn test_rows_left_with_index_only_are_dropped() {
        let mut chunk = chunks(vec![
            vec![json!(1), json!(10), Value::Null],
            vec![json!(2), Value::Null, json!(21)],
            vec![json!(3), json!(12), Value::Null],
        ])
        .remove(0);
        let request = PartialDeleteRequest::new().channel("A");
        let mut survived = SurvivedRanges::default();

        partial_delete_chunk(&mut chunk, &request, &mut survived).unwrap();
        assert_eq!(chunk.rows().unwrap(), vec![vec![json!(2), json!(21)]]);
        assert_eq!(chunk.range(), Range::bounded(2.0, 2.0));
        assert_eq!(chunk.record_count, 1);
        assert_eq!(survived.primary, Range::bounded(2.0, 2.0));
    }

    #[test]
    fn test_range_delete_nulls_values() {
        let mut chunk = chunks(vec![
            vec![json!(1), json!(10), json!(20)],
            vec![json!(2), json!(11), json!(21)],
            vec![json!(3), json!(12), json!(22)],
        ])
        .remove(0);
        let request = PartialDeleteRequest::new().range("A", Range::bounded(2.0, 3.0));
        let mut survived = SurvivedRanges::default();

        partial_delete_chunk(&mut chunk, &request, &mut survived).unwrap();
        assert_eq!(
            chunk.rows().unwrap(),
            vec![
                vec![json!(1), json!(10), json!(20)],
                vec![json!(2), Value::Null, json!(21)],
                vec![json!(3), Value::Null, json!(22)],
            ]
        );
        assert_eq!(survived.channel("A"), Some(&Range::bounded(1.0, 1.0)));
        assert_eq!(survived.channel("B"), Some(&Range::bounded(1.0, 3.0)));
    }

    #[test]
    fn test_untouched_chunk_still_folds_ranges() {
        let all = chunks(vec![
            vec![json!(1), json!(10), json!(20)],
            vec![json!(6), json!(11), json!(21)],
        ]);
        let request = PartialDeleteRequest::new().range("A", Range::bounded(5.0, 9.0));
        let mut survived = SurvivedRanges::default();

        let (changed, summary) = partial_delete(all, &request, &mut survived).unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].uid, "c1");
        assert_eq!(survived.primary, Range::bounded(1.0, 6.0));
        assert_eq!(survived.channel("A"), Some(&Range::bounded(1.0, 1.0)));
        assert_eq!(survived.channel("B"), Some(&Range::bounded(1.0, 6.0)));
    }

    #[test]
    fn test_all_rows_removed_marks_delete() {
        let all = chunks(vec![vec![json!(1), json!(10), json!(20)]]);
        let request = PartialDeleteRequest::new().channel("A").channel("B");
        let mut survived = SurvivedRanges::default();

        let (changed, summary) = partial_delete(all, &request, &mut survived).unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(changed[0].is_delete_marker());
        assert_eq!(changed[0].uid, "c0");
        assert!(survived.primary.is_unbounded());
    }
}

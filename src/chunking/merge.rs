//! Merge new or updated channel rows into stored chunks.
//!
//! ## Classification
//!
//! ```text
//! no stored chunks                          -> chunk the update as-is
//! one stored chunk, disjoint range,
//!   same mnemonics                          -> concatenate and re-chunk
//! anything else                             -> merge sequence
//! ```
//!
//! The merge sequence walks both inputs with direction-aware cursors:
//! an existing row before the update cursor is kept, an update row before
//! the existing cursor is inserted, and rows sharing an index are merged
//! column by column with the update winning.
//!
//! Re-chunked output keeps the uid of the first stored chunk it absorbs.
//! Stored uids that no output chunk claims become delete markers.

use std::collections::HashSet;

use crate::channel::{
    ChannelDataChunk, ChannelDataReader, ChannelIndexInfo, ChannelLayout, ChannelRecord,
};
use crate::config::ChunkingConfig;
use crate::error::{ChunkError, ChunkResult};
use crate::range::{compute_range, is_before, Range};

use super::builder::ChunkBuilder;

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub records: usize,
}

/// Chunks to hand to the store, plus what they amount to.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub chunks: Vec<ChannelDataChunk>,
    pub summary: MergeSummary,
}

/// Which path a merge took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    NoExisting,
    Prepend,
    Append,
    Sequence,
}

/// The update's range widened to whole buckets.
///
/// Every stored chunk that shares a bucket with an update row intersects
/// this window. `None` when the update has no rows.
pub fn merge_window(update: &ChannelDataReader, config: &ChunkingConfig) -> ChunkResult<Option<Range<f64>>> {
    let range = update.index_range()?;
    let (Some(start), Some(end)) = (range.start, range.end) else {
        return Ok(None);
    };

    let primary = update.primary_index();
    let size = primary.range_size(config);
    let first = compute_range(primary.to_scaled(start), size, primary.increasing);
    let last = compute_range(primary.to_scaled(end), size, primary.increasing);
    Ok(Some(Range::new(
        first.start.map(|v| primary.unscale(v)),
        last.end.map(|v| primary.unscale(v)),
    )))
}

/// Pick the merge path for `update` against the fetched `existing` chunks.
pub fn classify(existing: &[ChannelDataChunk], update: &ChannelDataReader) -> ChunkResult<MergeStrategy> {
    let stored: Vec<&ChannelDataChunk> = existing.iter().filter(|c| !c.is_delete_marker()).collect();
    let Some(first) = stored.first() else {
        return Ok(MergeStrategy::NoExisting);
    };

    let increasing = update.increasing();
    let mut existing_range = Range::unbounded();
    for chunk in &stored {
        existing_range.extend(&chunk.range(), increasing);
    }
    let update_range = update.index_range()?;

    if stored.len() == 1
        && !existing_range.overlaps(&update_range, increasing)
        && ChannelLayout::from_chunk(first)?.has_same_mnemonics(update.layout())
    {
        let before = match (update_range.end, existing_range.start) {
            (Some(end), Some(start)) => update.is_before(end, start),
            _ => false,
        };
        return Ok(if before {
            MergeStrategy::Prepend
        } else {
            MergeStrategy::Append
        });
    }

    Ok(MergeStrategy::Sequence)
}

/// Merge `update` into `existing` and re-chunk.
///
/// `existing` must be ordered by primary index in the update's direction,
/// as returned by the store. `update` must be sorted.
pub fn merge_chunks(
    existing: Vec<ChannelDataChunk>,
    update: ChannelDataReader,
    config: &ChunkingConfig,
) -> ChunkResult<MergeOutcome> {
    if update.is_empty() {
        return Ok(MergeOutcome::default());
    }

    let strategy = classify(&existing, &update)?;
    let range_size = update.primary_index().range_size(config);
    let existing_uids: Vec<String> = existing
        .iter()
        .filter(|c| !c.is_new())
        .map(|c| c.uid.clone())
        .collect();

    let (layout, records) = match strategy {
        MergeStrategy::NoExisting => update.into_parts(),
        MergeStrategy::Prepend | MergeStrategy::Append => {
            let stored = ChannelDataReader::from_chunks(&existing)?;
            let (layout, stored_records) = stored.into_parts();
            let (update_layout, update_records) = update.into_parts();
            let mapping = layout.mapping_from(&update_layout);
            let update_records = update_records
                .iter()
                .map(|r| r.remap(&mapping, layout.index_count()));

            let records: Vec<ChannelRecord> = if strategy == MergeStrategy::Prepend {
                update_records.chain(stored_records).collect()
            } else {
                stored_records.into_iter().chain(update_records).collect()
            };
            (layout, records)
        }
        MergeStrategy::Sequence => {
            let stored = ChannelDataReader::from_chunks(&existing)?;
            merge_sequence(stored, update)?
        }
    };

    let mut outcome = MergeOutcome::default();
    let mut claimed = HashSet::new();
    for chunk in ChunkBuilder::new(layout.clone(), records, range_size) {
        let chunk = chunk?;
        outcome.summary.records += chunk.record_count;
        if chunk.is_new() {
            outcome.summary.inserted += 1;
        } else {
            outcome.summary.updated += 1;
            claimed.insert(chunk.uid.clone());
        }
        outcome.chunks.push(chunk);
    }

    for uid in existing_uids.iter().filter(|uid| !claimed.contains(*uid)) {
        outcome
            .chunks
            .push(ChannelDataChunk::delete_marker(uid, layout.uri()));
        outcome.summary.deleted += 1;
    }

    Ok(outcome)
}

/// Interleave stored and update records into one ordered, duplicate-free
/// sequence laid out as the stored columns followed by new update channels.
pub fn merge_sequence(
    existing: ChannelDataReader,
    update: ChannelDataReader,
) -> ChunkResult<(ChannelLayout, Vec<ChannelRecord>)> {
    let (existing_layout, existing_records) = existing.into_parts();
    let (update_layout, update_records) = update.into_parts();

    if existing_layout.index_count() != update_layout.index_count() {
        return Err(ChunkError::InvalidData(format!(
            "update for '{}' has {} indices, stored data has {}",
            existing_layout.uri(),
            update_layout.index_count(),
            existing_layout.index_count()
        )));
    }

    let mut layout = existing_layout.clone();
    for (i, mnemonic) in update_layout.mnemonics().iter().enumerate() {
        layout.add_channel(
            mnemonic,
            &update_layout.units()[i],
            &update_layout.null_values()[i],
        );
    }

    let index_count = layout.index_count();
    let existing_mapping = layout.mapping_from(&existing_layout);
    let update_mapping = layout.mapping_from(&update_layout);
    // Merged-layout ordinals of the channels the update carries.
    let update_columns: Vec<usize> = update_layout
        .mnemonics()
        .iter()
        .filter_map(|m| layout.ordinal_of(m))
        .collect();

    let primary = layout.primary_index().clone();
    let increasing = primary.increasing;

    let mut existing_iter = existing_records.into_iter();
    let mut update_iter = update_records.into_iter();
    let mut e = next_keyed(&mut existing_iter, &primary)?;
    let mut u = next_keyed(&mut update_iter, &primary)?;
    let mut merged = Vec::new();

    loop {
        let step = match (&e, &u) {
            (None, None) => break,
            (Some(_), None) => Cursor::Existing,
            (None, Some(_)) => Cursor::Update,
            (Some((e_index, _)), Some((u_index, _))) => {
                if is_before(*e_index, *u_index, increasing) {
                    Cursor::Existing
                } else if is_before(*u_index, *e_index, increasing) {
                    Cursor::Update
                } else {
                    Cursor::Both
                }
            }
        };

        match step {
            Cursor::Existing => {
                if let Some((_, record)) = e.take() {
                    merged.push(record.remap(&existing_mapping, index_count));
                }
                e = next_keyed(&mut existing_iter, &primary)?;
            }
            Cursor::Update => {
                if let Some((_, record)) = u.take() {
                    merged.push(record.remap(&update_mapping, index_count));
                }
                u = next_keyed(&mut update_iter, &primary)?;
            }
            Cursor::Both => {
                if let (Some((_, stored)), Some((_, incoming))) = (e.take(), u.take()) {
                    let mut record = stored.remap(&existing_mapping, index_count);
                    let incoming = incoming.remap(&update_mapping, index_count);
                    for &column in &update_columns {
                        record.values_mut()[column] = incoming.values()[column].clone();
                    }
                    if record.has_channel_values() {
                        merged.push(record);
                    }
                }
                e = next_keyed(&mut existing_iter, &primary)?;
                u = next_keyed(&mut update_iter, &primary)?;
            }
        }
    }

    Ok((layout, merged))
}

enum Cursor {
    Existing,
    Update,
    Both,
}

fn next_keyed(
    records: &mut impl Iterator<Item = ChannelRecord>,
    primary: &ChannelIndexInfo,
) -> ChunkResult<Option<(f64, ChannelRecord)>> {
    records
        .next()
        .map(|record| record.index(primary).map(|index| (index, record)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            depth_range_size: 5,
            ..ChunkingConfig::default()
        }
    }

    fn reader(channels: &[&str], rows: Vec<Vec<Value>>) -> ChannelDataReader {
        let layout = ChannelLayout::new(
            "eml://log(1)",
            vec![ChannelIndexInfo::depth("MD", "m", true)],
            channels.iter().map(|c| (*c).to_string()).collect(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        ChannelDataReader::new(layout, rows).unwrap()
    }

    fn stored(channels: &[&str], rows: Vec<Vec<Value>>) -> Vec<ChannelDataChunk> {
        let chunks: Vec<_> = super::super::builder::build_chunks(reader(channels, rows), &config())
            .collect::<ChunkResult<_>>()
            .unwrap();
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.uid = format!("c{i}");
                c
            })
            .collect()
    }

    fn all_rows(chunks: &[ChannelDataChunk]) -> Vec<Vec<Value>> {
        chunks
            .iter()
            .filter(|c| !c.is_delete_marker())
            .flat_map(|c| c.rows().unwrap())
            .collect()
    }

    #[test]
    fn test_no_existing() {
        let update = reader(&["A"], vec![vec![json!(1), json!(10)]]);
        let outcome = merge_chunks(Vec::new(), update, &config()).unwrap();
        assert_eq!(outcome.summary.inserted, 1);
        assert_eq!(outcome.summary.records, 1);
    }

    #[test]
    fn test_append_path() {
        let existing = stored(&["A"], vec![vec![json!(1), json!(1)], vec![json!(2), json!(2)]]);
        let update = reader(&["A"], vec![vec![json!(3), json!(3)], vec![json!(7), json!(7)]]);
        assert_eq!(classify(&existing, &update).unwrap(), MergeStrategy::Append);

        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(outcome.summary.updated, 1);
        assert_eq!(outcome.summary.inserted, 1);
        assert_eq!(outcome.chunks[0].uid, "c0");
        assert_eq!(outcome.chunks[0].record_count, 3);
        assert_eq!(outcome.chunks[1].range(), Range::bounded(7.0, 7.0));
    }

    #[test]
    fn test_prepend_path() {
        let existing = stored(&["A"], vec![vec![json!(8), json!(8)]]);
        let update = reader(&["A"], vec![vec![json!(6), json!(6)]]);
        assert_eq!(classify(&existing, &update).unwrap(), MergeStrategy::Prepend);

        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].uid, "c0");
        assert_eq!(outcome.chunks[0].range(), Range::bounded(6.0, 8.0));
    }

    #[test]
    fn test_overlap_uses_sequence() {
        let existing = stored(&["A"], vec![vec![json!(1), json!(1)], vec![json!(3), json!(3)]]);
        let update = reader(&["A"], vec![vec![json!(2), json!(2)]]);
        assert_eq!(classify(&existing, &update).unwrap(), MergeStrategy::Sequence);

        let outcome = merge_chunks(existing, update, &config()).unwrap();
        let indexes: Vec<Value> = all_rows(&outcome.chunks).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(indexes, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_identical_rows_are_idempotent() {
        let rows = vec![vec![json!(1), json!(1)], vec![json!(2), json!(2)]];
        let existing = stored(&["A"], rows.clone());
        let update = reader(&["A"], rows.clone());
        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(all_rows(&outcome.chunks), rows);
        assert_eq!(outcome.summary.deleted, 0);
    }

    #[test]
    fn test_equal_index_overwrites_update_columns_only() {
        let existing = stored(
            &["A", "B"],
            vec![vec![json!(1), json!(10), json!(20)], vec![json!(2), json!(11), json!(21)]],
        );
        let update = reader(&["B"], vec![vec![json!(2), json!(99)]]);
        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(
            all_rows(&outcome.chunks),
            vec![vec![json!(1), json!(10), json!(20)], vec![json!(2), json!(11), json!(99)]]
        );
    }

    #[test]
    fn test_row_left_empty_is_dropped() {
        let existing = stored(&["A"], vec![vec![json!(1), json!(1)], vec![json!(2), json!(2)]]);
        let update = reader(&["A"], vec![vec![json!(2), Value::Null]]);
        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(all_rows(&outcome.chunks), vec![vec![json!(1), json!(1)]]);
    }

    #[test]
    fn test_unclaimed_chunk_is_deleted() {
        let existing = stored(&["A"], vec![vec![json!(1), json!(1)], vec![json!(6), json!(6)]]);
        assert_eq!(existing.len(), 2);
        let update = reader(&["A"], vec![vec![json!(6), Value::Null]]);
        let outcome = merge_chunks(existing, update, &config()).unwrap();
        assert_eq!(outcome.summary.deleted, 1);
        let marker = outcome.chunks.iter().find(|c| c.is_delete_marker()).unwrap();
        assert_eq!(marker.uid, "c1");
    }

    #[test]
    fn test_merge_window_expands_to_buckets() {
        let update = reader(&["A"], vec![vec![json!(6), json!(1)], vec![json!(12), json!(1)]]);
        let window = merge_window(&update, &config()).unwrap().unwrap();
        assert_eq!(window, Range::bounded(5.0, 15.0));

        let empty = reader(&["A"], Vec::new());
        assert!(merge_window(&empty, &config()).unwrap().is_none());
    }
}

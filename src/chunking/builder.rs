//! Partition ordered channel records into bounded chunks.
//!
//! The builder is a lazy iterator. It opens a bucket with
//! `compute_range` from the first record, keeps accumulating while the
//! records fall inside it, and emits a chunk when a record lands outside.
//! Chunk bounds are the first and last index actually seen, never the
//! bucket edges.

use std::collections::HashSet;

use serde_json::Value;

use crate::channel::{ChannelDataChunk, ChannelDataReader, ChannelLayout, ChannelRecord};
use crate::config::ChunkingConfig;
use crate::error::{ChunkError, ChunkResult};
use crate::range::{compute_range, is_before, Range};

/// Lazy, single-pass chunk producer.
///
/// Yields `Err` once on the first invalid record and then stops.
pub struct ChunkBuilder<I> {
    records: I,
    layout: ChannelLayout,
    range_size: i64,
    bucket: Option<Range<i64>>,
    pending: Vec<ChannelRecord>,
    chunk_start: Option<f64>,
    chunk_end: Option<f64>,
    claimed: HashSet<String>,
    done: bool,
}

impl<I> ChunkBuilder<I>
where
    I: Iterator<Item = ChannelRecord>,
{
    pub fn new<R>(layout: ChannelLayout, records: R, range_size: i64) -> Self
    where
        R: IntoIterator<IntoIter = I>,
    {
        ChunkBuilder {
            records: records.into_iter(),
            layout,
            range_size,
            bucket: None,
            pending: Vec::new(),
            chunk_start: None,
            chunk_end: None,
            claimed: HashSet::new(),
            done: false,
        }
    }

    fn check_sequence(&self, index: f64) -> ChunkResult<()> {
        let Some(previous) = self.chunk_end else {
            return Ok(());
        };
        let primary = self.layout.primary_index();
        if index == previous {
            return Err(ChunkError::NodesWithSameIndex {
                mnemonic: primary.mnemonic.clone(),
                index,
            });
        }
        if is_before(index, previous, primary.increasing) {
            return Err(ChunkError::IndexOutOfSequence {
                mnemonic: primary.mnemonic.clone(),
                previous,
                index,
                increasing: primary.increasing,
            });
        }
        Ok(())
    }

    fn accept(&mut self, record: ChannelRecord) -> ChunkResult<Option<ChannelDataChunk>> {
        let primary = self.layout.primary_index();
        let increasing = primary.increasing;
        let value = record.index_value(primary)?;
        let index = value.as_f64();
        let scaled = value.to_scaled(primary.scale, increasing);
        self.check_sequence(index)?;

        let inside = self
            .bucket
            .is_some_and(|bucket| bucket.contains_half_open(scaled, increasing));

        let finished = if inside {
            None
        } else {
            let finished = self.finish()?;
            self.bucket = Some(compute_range(scaled, self.range_size, increasing));
            finished
        };

        if self.chunk_start.is_none() {
            self.chunk_start = Some(index);
        }
        self.chunk_end = Some(index);
        self.pending.push(record);
        Ok(finished)
    }

    /// Close the in-progress chunk, if any.
    fn finish(&mut self) -> ChunkResult<Option<ChannelDataChunk>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let records = std::mem::take(&mut self.pending);
        let uid = records
            .iter()
            .filter_map(ChannelRecord::source)
            .find(|uid| !self.claimed.contains(*uid))
            .map(str::to_string)
            .unwrap_or_default();
        if !uid.is_empty() {
            self.claimed.insert(uid.clone());
        }

        let rows: Vec<Vec<Value>> = records.into_iter().map(ChannelRecord::into_row).collect();

        let mut indices = self.layout.indices().to_vec();
        for (ordinal, index) in indices.iter_mut().enumerate() {
            if ordinal == 0 {
                index.start = self.chunk_start;
                index.end = self.chunk_end;
            } else {
                let cell = |row: Option<&Vec<Value>>| {
                    row.and_then(|r| r.get(ordinal))
                        .and_then(|cell| index.parse_value(cell).ok())
                        .map(|v| v.as_f64())
                };
                let start = cell(rows.first());
                let end = cell(rows.last());
                index.start = start;
                index.end = end;
            }
        }

        let mut chunk = ChannelDataChunk {
            uid,
            uri: self.layout.uri().to_string(),
            indices,
            ..ChannelDataChunk::default()
        };
        chunk.set_columns(
            &self.layout.all_mnemonics(),
            &self.layout.all_units(),
            &self.layout.all_null_values(),
        );
        chunk.set_rows(&rows)?;

        self.chunk_start = None;
        Ok(Some(chunk))
    }
}

impl<I> Iterator for ChunkBuilder<I>
where
    I: Iterator<Item = ChannelRecord>,
{
    type Item = ChunkResult<ChannelDataChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let step = match self.records.next() {
                Some(record) => self.accept(record),
                None => {
                    self.done = true;
                    self.finish()
                }
            };
            match step {
                Ok(Some(chunk)) => return Some(Ok(chunk)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Chunk a whole reader with the configured bucket size.
pub fn build_chunks(
    reader: ChannelDataReader,
    config: &ChunkingConfig,
) -> ChunkBuilder<std::vec::IntoIter<ChannelRecord>> {
    let (layout, records) = reader.into_parts();
    let range_size = layout.primary_index().range_size(config);
    ChunkBuilder::new(layout, records, range_size)
}

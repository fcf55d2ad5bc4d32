//! Fetch Limits
//!
//! Bounds how many chunks a range read pulls from the document store.
//! Limits are checked cooperatively: the reader walks chunks in index
//! order and asks `should_stop` after each one.

use crate::channel::ChannelDataChunk;
use crate::range::{is_before, Range};

/// When a range read may stop taking chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimiter {
    /// Stop once the accumulated record count exceeds `max_nodes`.
    StrictNodeCount { max_nodes: usize },
    /// Stop once `max_nodes` is exceeded and the last chunk reaches the
    /// end of the requested range. Never stops on an open-ended range.
    SearchUntilFoundOrEnd { max_nodes: usize },
}

impl FetchLimiter {
    pub fn strict(max_nodes: usize) -> Self {
        FetchLimiter::StrictNodeCount { max_nodes }
    }

    pub fn search_until_found(max_nodes: usize) -> Self {
        FetchLimiter::SearchUntilFoundOrEnd { max_nodes }
    }

    /// Whether to stop after taking `chunk`, with `total` records taken so far.
    pub fn should_stop(
        &self,
        total: usize,
        chunk: &ChannelDataChunk,
        range: &Range<f64>,
        increasing: bool,
    ) -> bool {
        match *self {
            FetchLimiter::StrictNodeCount { max_nodes } => total > max_nodes,
            FetchLimiter::SearchUntilFoundOrEnd { max_nodes } => {
                if total <= max_nodes {
                    return false;
                }
                match (range.end, chunk.range().end) {
                    (Some(wanted), Some(reached)) => !is_before(reached, wanted, increasing),
                    _ => false,
                }
            }
        }
    }

    /// Keep the chunks a read is allowed to return, in order.
    pub fn take(
        &self,
        chunks: Vec<ChannelDataChunk>,
        range: &Range<f64>,
        increasing: bool,
    ) -> Vec<ChannelDataChunk> {
        let mut total = 0;
        let mut kept = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            total += chunk.record_count;
            let stop = self.should_stop(total, &chunk, range, increasing);
            kept.push(chunk);
            if stop {
                break;
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelIndexInfo;

    fn chunk(start: f64, end: f64, records: usize) -> ChannelDataChunk {
        let mut index = ChannelIndexInfo::depth("MD", "m", true);
        index.start = Some(start);
        index.end = Some(end);
        ChannelDataChunk {
            uid: format!("{start}"),
            uri: "u".to_string(),
            indices: vec![index],
            record_count: records,
            ..ChannelDataChunk::default()
        }
    }

    fn chunks() -> Vec<ChannelDataChunk> {
        (0..10)
            .map(|i| chunk(f64::from(i) * 10.0, f64::from(i) * 10.0 + 9.0, 60))
            .collect()
    }

    #[test]
    fn test_strict_stops_after_budget() {
        // 60 <= 100, 120 > 100: the second chunk is the last one taken
        let kept = FetchLimiter::strict(100).take(chunks(), &Range::unbounded(), true);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_strict_exact_budget_continues() {
        let kept = FetchLimiter::strict(120).take(chunks(), &Range::unbounded(), true);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_search_until_reaches_range_end() {
        let range = Range::bounded(0.0, 45.0);
        let kept = FetchLimiter::search_until_found(100).take(chunks(), &range, true);
        // budget is spent after two chunks, but 19 is still before 45
        assert_eq!(kept.len(), 5);
        assert_eq!(kept[4].range().end, Some(49.0));
    }

    #[test]
    fn test_search_until_open_range_takes_all() {
        let range = Range::new(Some(0.0), None);
        let kept = FetchLimiter::search_until_found(10).take(chunks(), &range, true);
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn test_search_until_decreasing() {
        let desc: Vec<ChannelDataChunk> = (0..5)
            .rev()
            .map(|i| {
                let mut c = chunk(f64::from(i) * 10.0 + 9.0, f64::from(i) * 10.0, 60);
                c.indices[0].increasing = false;
                c
            })
            .collect();
        let range = Range::bounded(49.0, 25.0);
        let kept = FetchLimiter::search_until_found(50).take(desc, &range, false);
        // ends 40, 30, 20: 20 is no longer before 25 in decreasing order
        assert_eq!(kept.len(), 3);
    }
}

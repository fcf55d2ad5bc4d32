//! Direction-aware range arithmetic over nullable bounds.
//!
//! Channel indexes may grow upward (depth, time) or downward (e.g. a
//! log recorded while pulling out of hole). Every comparison here takes
//! an `increasing` flag: "before" means numerically smaller when the
//! index increases and numerically larger when it decreases. A missing
//! bound is unbounded on that side.

use serde::{Deserialize, Serialize};

/// `true` when `a` comes strictly before `b` in index order.
#[inline]
pub fn is_before<T: PartialOrd>(a: T, b: T, increasing: bool) -> bool {
    if increasing {
        a < b
    } else {
        a > b
    }
}

/// An index interval with optional, inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub start: Option<T>,
    pub end: Option<T>,
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Range {
            start: None,
            end: None,
        }
    }
}

impl<T: Copy + PartialOrd> Range<T> {
    pub fn new(start: Option<T>, end: Option<T>) -> Self {
        Range { start, end }
    }

    pub fn bounded(start: T, end: T) -> Self {
        Range {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn unbounded() -> Self {
        Range::default()
    }

    /// Neither bound is known.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// The range starts strictly before `value`. An open start does.
    pub fn starts_before(&self, value: T, increasing: bool) -> bool {
        self.start.map_or(true, |start| is_before(start, value, increasing))
    }

    /// The range starts strictly after `value`.
    pub fn starts_after(&self, value: T, increasing: bool) -> bool {
        self.start.is_some_and(|start| is_before(value, start, increasing))
    }

    /// The range ends strictly before `value`.
    pub fn ends_before(&self, value: T, increasing: bool) -> bool {
        self.end.is_some_and(|end| is_before(end, value, increasing))
    }

    /// The range ends strictly after `value`. An open end does.
    pub fn ends_after(&self, value: T, increasing: bool) -> bool {
        self.end.map_or(true, |end| is_before(value, end, increasing))
    }

    /// Inclusive containment.
    pub fn contains(&self, value: T, increasing: bool) -> bool {
        !self.starts_after(value, increasing) && !self.ends_before(value, increasing)
    }

    /// Containment with the end bound excluded, as used for chunk buckets.
    pub fn contains_half_open(&self, value: T, increasing: bool) -> bool {
        !self.starts_after(value, increasing) && self.ends_after(value, increasing)
    }

    /// True unless one range ends strictly before the other starts.
    pub fn overlaps(&self, other: &Range<T>, increasing: bool) -> bool {
        let self_first = match (self.end, other.start) {
            (Some(end), Some(start)) => is_before(end, start, increasing),
            _ => false,
        };
        let other_first = match (other.end, self.start) {
            (Some(end), Some(start)) => is_before(end, start, increasing),
            _ => false,
        };
        !(self_first || other_first)
    }

    /// Widen this range so it also covers `other`.
    pub fn extend(&mut self, other: &Range<T>, increasing: bool) {
        if let Some(start) = other.start {
            if self.start.map_or(true, |s| is_before(start, s, increasing)) {
                self.start = Some(start);
            }
        }
        if let Some(end) = other.end {
            if self.end.map_or(true, |e| is_before(e, end, increasing)) {
                self.end = Some(end);
            }
        }
    }
}

/// Bucket `index` into the fixed-width interval aligned to `range_size`.
///
/// Increasing buckets run `[k * size, (k + 1) * size)`, decreasing ones
/// `[k * size, (k - 1) * size)`. The result depends only on the bucket
/// the index falls into, never on which index of that bucket arrived
/// first.
pub fn compute_range(index: i64, range_size: i64, increasing: bool) -> Range<i64> {
    let size = range_size.max(1);
    if increasing {
        let start = index.div_euclid(size) * size;
        Range::bounded(start, start + size)
    } else {
        let start = -((-index).div_euclid(size)) * size;
        Range::bounded(start, start - size)
    }
}

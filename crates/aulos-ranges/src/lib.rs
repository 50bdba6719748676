#![forbid(unsafe_code)]

//! Time-range algebra over buffered media time.
//!
//! [`TimeRanges`] tracks which intervals of the media timeline are buffered.
//! It stays sorted and disjoint, merging ranges that come closer than
//! [`CONTIGUOUS_EPSILON`] — media sinks round segment boundaries, so two
//! adjacent segments rarely touch exactly.

/// Ranges closer than this (in seconds) are considered contiguous.
///
/// One frame at 60fps: the worst-case rounding a sink applies to segment
/// boundaries.
pub const CONTIGUOUS_EPSILON: f64 = 1.0 / 60.0;

/// A half-open interval `[start, end)` of media time, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Create a range. `end` is clamped to at least `start`.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Half-open containment: `start <= t < end`.
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    /// Whether `other` overlaps or comes within `CONTIGUOUS_EPSILON`.
    #[must_use]
    pub fn touches(&self, other: &TimeRange) -> bool {
        self.start <= other.end + CONTIGUOUS_EPSILON && other.start <= self.end + CONTIGUOUS_EPSILON
    }
}

/// A sorted, disjoint set of [`TimeRange`]s.
///
/// Mutates only via [`insert`](Self::insert) (which merges near-contiguous
/// ranges) and [`exclude`](Self::exclude) (which subtracts exactly). Empty
/// ranges never survive either operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    #[must_use]
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Build a set from ranges in any order.
    #[must_use]
    pub fn from_unordered<I: IntoIterator<Item = TimeRange>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.insert(r);
        }
        set
    }

    #[must_use]
    pub fn as_slice(&self) -> &[TimeRange] {
        &self.ranges
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Sum of all range durations.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.ranges.iter().map(TimeRange::duration).sum()
    }

    /// Insert a range, merging every stored range that overlaps or comes
    /// within [`CONTIGUOUS_EPSILON`] of it. Empty ranges are discarded.
    pub fn insert(&mut self, range: TimeRange) {
        if range.is_empty() {
            return;
        }

        let mut merged = range;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;

        for r in &self.ranges {
            if r.touches(&merged) {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
            } else if r.end < merged.start {
                out.push(*r);
            } else {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(*r);
            }
        }
        if !placed {
            out.push(merged);
        }

        self.ranges = out;
    }

    /// Subtract `cut` exactly (no epsilon tolerance), splitting ranges that
    /// straddle it. Fragments shorter than machine noise are discarded.
    pub fn exclude(&mut self, cut: TimeRange) {
        if cut.is_empty() {
            return;
        }

        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        for r in &self.ranges {
            if cut.end <= r.start || r.end <= cut.start {
                out.push(*r);
                continue;
            }
            let left = TimeRange::new(r.start, cut.start.min(r.end));
            if !left.is_empty() {
                out.push(left);
            }
            let right = TimeRange::new(cut.end.max(r.start), r.end);
            if !right.is_empty() {
                out.push(right);
            }
        }
        self.ranges = out;
    }

    /// Subtract every range of `cuts`.
    pub fn exclude_all(&mut self, cuts: &TimeRanges) {
        for cut in &cuts.ranges {
            self.exclude(*cut);
        }
    }

    /// Ranges covered by both sets.
    #[must_use]
    pub fn intersect(&self, other: &TimeRanges) -> TimeRanges {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = self.ranges[i];
            let b = other.ranges[j];
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.push(TimeRange::new(start, end));
            }
            if a.end <= b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        TimeRanges { ranges: out }
    }

    /// The range containing `t`, if any (half-open).
    #[must_use]
    pub fn range_at(&self, t: f64) -> Option<TimeRange> {
        self.ranges.iter().find(|r| r.contains(t)).copied()
    }

    /// Half-open containment test.
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.range_at(t).is_some()
    }

    /// Seconds remaining in the range containing `t`, or `+∞` when `t` is
    /// not inside any range (including at an exact range end).
    #[must_use]
    pub fn left_size(&self, t: f64) -> f64 {
        self.range_at(t).map_or(f64::INFINITY, |r| r.end - t)
    }

    /// Distance from `t` to the start of the next range strictly ahead,
    /// or `+∞` when no range starts after `t`.
    #[must_use]
    pub fn next_gap(&self, t: f64) -> f64 {
        self.ranges
            .iter()
            .find(|r| r.start > t)
            .map_or(f64::INFINITY, |r| r.start - t)
    }

    /// Buffered time ahead of `position`: alias of [`left_size`](Self::left_size),
    /// named for the playback clock's use.
    #[must_use]
    pub fn buffer_gap(&self, position: f64) -> f64 {
        self.left_size(position)
    }
}

impl FromIterator<TimeRange> for TimeRanges {
    fn from_iter<I: IntoIterator<Item = TimeRange>>(iter: I) -> Self {
        Self::from_unordered(iter)
    }
}

use std::ops::Range;

use url::Url;

/// One media or initialization segment of a representation.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentInfo {
    /// Identity within the representation, stable across index refreshes.
    pub id: u64,
    /// Presentation start time, in seconds.
    pub start: f64,
    /// Duration in seconds. Zero for init segments.
    pub duration: f64,
    /// Whether this is the initialization segment.
    pub is_init: bool,
    /// Offset to add to media timestamps when appending.
    pub time_offset: f64,
    /// Byte range within the resource, when the segment is range-addressed.
    pub byte_range: Option<Range<u64>>,
    /// Candidate URLs, one per CDN, in manifest order.
    pub urls: Vec<Url>,
}

impl SegmentInfo {
    /// Presentation end time, in seconds.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Lazy sequence of segments for one representation.
///
/// Implementations come from the transport layer (DASH templates, HLS media
/// playlists). Within an index, media segments have non-decreasing start
/// times.
pub trait SegmentIndex: Send + Sync {
    /// The initialization segment, if the representation has one.
    fn init_segment(&self) -> Option<SegmentInfo>;

    /// Media segments intersecting `[start, end)`, in presentation order.
    fn segments_in(&self, start: f64, end: f64) -> Vec<SegmentInfo>;

    /// Presentation end time of the last known segment, if known.
    fn end_time(&self) -> Option<f64>;

    /// Whether no further segments will ever be announced.
    fn is_final(&self) -> bool;
}

/// Straightforward in-memory index over an explicit segment timeline.
///
/// Backs tests and DASH-style `SegmentTimeline` indexes once the transport
/// has resolved them.
pub struct TimelineIndex {
    init: Option<SegmentInfo>,
    media: Vec<SegmentInfo>,
    is_final: bool,
}

impl TimelineIndex {
    /// Build an index from media segments sorted by start time.
    #[must_use]
    pub fn new(init: Option<SegmentInfo>, mut media: Vec<SegmentInfo>, is_final: bool) -> Self {
        media.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self {
            init,
            media,
            is_final,
        }
    }

    /// Uniform-duration timeline: `count` segments of `duration` seconds
    /// starting at `first_start`, one URL each derived from `base` by
    /// segment number.
    #[must_use]
    pub fn uniform(
        base: &Url,
        first_start: f64,
        duration: f64,
        count: usize,
        init: Option<SegmentInfo>,
    ) -> Self {
        let media = (0..count)
            .map(|i| {
                let start = first_start + duration * i as f64;
                let url = base
                    .join(&format!("segment-{i}.m4s"))
                    .unwrap_or_else(|_| base.clone());
                SegmentInfo {
                    id: i as u64,
                    start,
                    duration,
                    is_init: false,
                    time_offset: 0.0,
                    byte_range: None,
                    urls: vec![url],
                }
            })
            .collect();
        Self {
            init,
            media,
            is_final: true,
        }
    }
}

impl SegmentIndex for TimelineIndex {
    fn init_segment(&self) -> Option<SegmentInfo> {
        self.init.clone()
    }

    fn segments_in(&self, start: f64, end: f64) -> Vec<SegmentInfo> {
        self.media
            .iter()
            .filter(|s| s.start < end && start < s.end())
            .cloned()
            .collect()
    }

    fn end_time(&self) -> Option<f64> {
        self.media.last().map(SegmentInfo::end)
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example/rep/").unwrap()
    }

    #[test]
    fn uniform_index_covers_requested_window() {
        let idx = TimelineIndex::uniform(&base(), 0.0, 4.0, 10, None);
        let hits = idx.segments_in(5.0, 13.0);
        // Segments [4,8), [8,12), [12,16) intersect [5,13).
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].start, 4.0);
        assert_eq!(hits[2].start, 12.0);
    }

    #[test]
    fn segments_in_is_half_open() {
        let idx = TimelineIndex::uniform(&base(), 0.0, 4.0, 4, None);
        // Window starting exactly at a segment end excludes that segment.
        let hits = idx.segments_in(4.0, 8.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 4.0);
    }

    #[test]
    fn end_time_is_last_segment_end() {
        let idx = TimelineIndex::uniform(&base(), 2.0, 4.0, 3, None);
        assert_eq!(idx.end_time(), Some(14.0));
    }

    #[test]
    fn unsorted_timeline_is_sorted_on_build() {
        let seg = |id: u64, start: f64| SegmentInfo {
            id,
            start,
            duration: 2.0,
            is_init: false,
            time_offset: 0.0,
            byte_range: None,
            urls: vec![base()],
        };
        let idx = TimelineIndex::new(None, vec![seg(1, 6.0), seg(0, 4.0)], true);
        let all = idx.segments_in(0.0, 100.0);
        assert_eq!(all[0].start, 4.0);
        assert_eq!(all[1].start, 6.0);
    }
}

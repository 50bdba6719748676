/// Mapping from "seconds until playback needs this segment" to a scheduler
/// priority (lower number runs first).
#[derive(Clone, Debug)]
pub struct PrioritySteps {
    /// `(distance_upper_bound_secs, priority)` buckets, ascending.
    pub buckets: Vec<(f64, i32)>,
    /// Priority beyond the last bucket.
    pub fallback: i32,
}

impl Default for PrioritySteps {
    fn default() -> Self {
        Self {
            buckets: vec![(4.0, 0), (8.0, 2), (12.0, 5), (20.0, 10), (40.0, 16)],
            fallback: 20,
        }
    }
}

/// Priority for a segment starting `distance` seconds ahead of the playhead.
///
/// Negative distances (the segment is at or behind the playhead) take the
/// most urgent bucket.
#[must_use]
pub fn priority_for_distance(distance: f64, steps: &PrioritySteps) -> i32 {
    for &(bound, priority) in &steps.buckets {
        if distance < bound {
            return priority;
        }
    }
    steps.fallback
}

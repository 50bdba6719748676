use crate::RepresentationInfo;

/// Buffer level required before the top ladder tier is reachable, seconds.
const TOP_TIER_BUFFER_SECS: f64 = 30.0;

/// Buffer-occupancy-based tier selection.
///
/// Maps the current buffer gap to a ladder tier through log-spaced
/// thresholds: the lowest tier is always reachable, the top tier needs
/// [`TOP_TIER_BUFFER_SECS`] of buffer. A large buffer is evidence the
/// network outruns playback even when throughput samples say otherwise
/// (e.g. heavily throttled CDNs).
#[derive(Clone, Debug)]
pub struct BufferBasedChooser {
    ladder: Vec<RepresentationInfo>,
    /// Buffer-gap threshold per ladder tier, same order as `ladder`.
    levels: Vec<f64>,
}

impl BufferBasedChooser {
    /// `ladder` must be sorted by ascending bitrate.
    #[must_use]
    pub fn new(ladder: Vec<RepresentationInfo>) -> Self {
        let levels = Self::compute_levels(&ladder);
        Self { ladder, levels }
    }

    fn compute_levels(ladder: &[RepresentationInfo]) -> Vec<f64> {
        let Some(first) = ladder.first() else {
            return Vec::new();
        };
        let Some(last) = ladder.last() else {
            return Vec::new();
        };
        if ladder.len() < 2 || first.bitrate == 0 || last.bitrate <= first.bitrate {
            return vec![0.0; ladder.len()];
        }

        let span = (last.bitrate as f64 / first.bitrate as f64).ln();
        ladder
            .iter()
            .map(|r| {
                let ratio = (r.bitrate as f64 / first.bitrate as f64).ln() / span;
                TOP_TIER_BUFFER_SECS * ratio
            })
            .collect()
    }

    /// Replace the ladder (e.g. after a decipherability refilter).
    pub fn update_ladder(&mut self, ladder: Vec<RepresentationInfo>) {
        self.levels = Self::compute_levels(&ladder);
        self.ladder = ladder;
    }

    /// The bitrate the buffer occupancy justifies, or `None` when the
    /// chooser has nothing to say (degenerate ladder, position outside the
    /// buffer).
    #[must_use]
    pub fn choose(
        &self,
        buffer_gap: f64,
        current_bitrate: Option<u64>,
        current_score: Option<f64>,
        speed: f64,
    ) -> Option<u64> {
        if self.ladder.len() < 2 || !buffer_gap.is_finite() {
            return None;
        }

        // Faster playback drains the same buffer sooner.
        let scaled_gap = if speed > 1.0 {
            buffer_gap / speed
        } else {
            buffer_gap
        };

        let mut tier = self
            .levels
            .iter()
            .rposition(|&level| level <= scaled_gap)
            .unwrap_or(0);

        // An unmaintainable current representation caps buffer-driven
        // optimism at the current tier.
        if let (Some(current), Some(score)) = (current_bitrate, current_score) {
            let scaled_score = if speed > 0.0 { score / speed } else { score };
            if scaled_score < 1.0 {
                if let Some(current_tier) =
                    self.ladder.iter().position(|r| r.bitrate == current)
                {
                    tier = tier.min(current_tier);
                }
            }
        }

        Some(self.ladder[tier].bitrate)
    }
}

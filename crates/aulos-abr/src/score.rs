use std::collections::HashMap;

use aulos_media::RepresentationId;

use crate::{AbrOptions, RepresentationInfo, bandwidth::Ewma};

const SCORE_HALF_LIFE_SECS: f64 = 8.0;

#[derive(Clone, Debug)]
struct RepresentationScore {
    ewma: Ewma,
    samples: u32,
}

/// Tracks whether each representation can be downloaded faster than it
/// plays.
///
/// Each completed segment contributes `segment_duration / request_duration`:
/// above 1 the representation keeps up, below 1 it falls behind. Scores are
/// only trusted once enough samples have accumulated.
#[derive(Debug, Default)]
pub struct ScoreCalculator {
    scores: HashMap<RepresentationId, RepresentationScore>,
    stable_score_threshold: f64,
    confidence_samples: u32,
}

impl ScoreCalculator {
    #[must_use]
    pub fn new(options: &AbrOptions) -> Self {
        Self {
            scores: HashMap::new(),
            stable_score_threshold: options.stable_score_threshold,
            confidence_samples: options.score_confidence_samples,
        }
    }

    /// Record one completed segment download for `representation`.
    pub fn add_sample(
        &mut self,
        representation: RepresentationId,
        segment_duration: f64,
        request_duration: f64,
    ) {
        if segment_duration <= 0.0 || request_duration <= 0.0 {
            return;
        }
        let entry = self
            .scores
            .entry(representation)
            .or_insert_with(|| RepresentationScore {
                ewma: Ewma::new(SCORE_HALF_LIFE_SECS),
                samples: 0,
            });
        entry
            .ewma
            .add_sample(request_duration, segment_duration / request_duration);
        entry.samples += 1;
    }

    /// Current score for `representation`, if any sample exists.
    #[must_use]
    pub fn score(&self, representation: RepresentationId) -> Option<f64> {
        self.scores.get(&representation).map(|s| s.ewma.estimate())
    }

    /// Whether the representation demonstrably keeps up with playback.
    #[must_use]
    pub fn is_maintainable(&self, representation: RepresentationId) -> Option<bool> {
        let entry = self.scores.get(&representation)?;
        if entry.samples < self.confidence_samples {
            return None;
        }
        Some(entry.ewma.estimate() >= 1.0)
    }

    /// The highest-bitrate representation whose score clears the stability
    /// threshold with confidence.
    #[must_use]
    pub fn last_stable_representation(
        &self,
        representations: &[RepresentationInfo],
    ) -> Option<RepresentationInfo> {
        representations
            .iter()
            .filter(|r| {
                self.scores.get(&r.id).is_some_and(|s| {
                    s.samples >= self.confidence_samples
                        && s.ewma.estimate() > self.stable_score_threshold
                })
            })
            .max_by_key(|r| r.bitrate)
            .copied()
    }

    /// Forget a representation (e.g. it became undecipherable).
    pub fn remove(&mut self, representation: RepresentationId) {
        self.scores.remove(&representation);
    }
}

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{AdaptationId, PeriodId, RepresentationId, SegmentIndex};

/// Track kind a period exposes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TrackKind {
    Audio,
    Video,
    Text,
}

impl TrackKind {
    /// Text tracks are non-native: their sink failures must not kill playback.
    #[must_use]
    pub fn is_native(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A single encoding of an adaptation.
#[derive(Clone)]
pub struct Representation {
    pub id: RepresentationId,
    /// Nominal bitrate in bits per second.
    pub bitrate: u64,
    /// Codec string, e.g. `avc1.4d401e`.
    pub codec: String,
    /// Container mime type, e.g. `video/mp4`.
    pub mime: String,
    pub index: Arc<dyn SegmentIndex>,
}

impl std::fmt::Debug for Representation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Representation")
            .field("id", &self.id)
            .field("bitrate", &self.bitrate)
            .field("codec", &self.codec)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

/// A track variant family, e.g. "English audio".
#[derive(Clone, Debug)]
pub struct Adaptation {
    pub id: AdaptationId,
    pub kind: TrackKind,
    /// Representations ordered by ascending bitrate.
    pub representations: Vec<RepresentationId>,
    pub language: Option<String>,
}

/// A time interval of the presentation with a fixed set of adaptations.
#[derive(Clone, Debug)]
pub struct Period {
    pub id: PeriodId,
    /// Presentation start, in seconds.
    pub start: f64,
    /// Presentation end, in seconds. `None` for the last period of a live
    /// presentation.
    pub end: Option<f64>,
    pub adaptations: Vec<AdaptationId>,
}

/// Parsed presentation description.
///
/// Immutable after construction except for decipherability flags, which the
/// DRM supervisor updates through [`update_decipherability`]; all observers
/// learn of updates through [`decipherability_updates`].
///
/// [`update_decipherability`]: Manifest::update_decipherability
/// [`decipherability_updates`]: Manifest::decipherability_updates
pub struct Manifest {
    periods: Vec<Period>,
    adaptations: HashMap<AdaptationId, Adaptation>,
    representations: HashMap<RepresentationId, Representation>,
    duration: Option<f64>,
    decipherability: RwLock<HashMap<RepresentationId, bool>>,
    decipherability_tx: broadcast::Sender<Vec<RepresentationId>>,
}

impl Manifest {
    #[must_use]
    pub fn new(
        periods: Vec<Period>,
        adaptations: Vec<Adaptation>,
        representations: Vec<Representation>,
        duration: Option<f64>,
    ) -> Self {
        let (decipherability_tx, _) = broadcast::channel(8);
        Self {
            periods,
            adaptations: adaptations.into_iter().map(|a| (a.id, a)).collect(),
            representations: representations.into_iter().map(|r| (r.id, r)).collect(),
            duration,
            decipherability: RwLock::new(HashMap::new()),
            decipherability_tx,
        }
    }

    /// Total presentation duration in seconds, if known.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Periods in presentation order.
    #[must_use]
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    #[must_use]
    pub fn period(&self, id: PeriodId) -> Option<&Period> {
        self.periods.iter().find(|p| p.id == id)
    }

    /// The period containing presentation time `t`.
    #[must_use]
    pub fn period_at(&self, t: f64) -> Option<&Period> {
        self.periods
            .iter()
            .find(|p| p.start <= t && p.end.is_none_or(|end| t < end))
    }

    #[must_use]
    pub fn adaptation(&self, id: AdaptationId) -> Option<&Adaptation> {
        self.adaptations.get(&id)
    }

    #[must_use]
    pub fn representation(&self, id: RepresentationId) -> Option<&Representation> {
        self.representations.get(&id)
    }

    /// Adaptations of `period` carrying tracks of `kind`.
    #[must_use]
    pub fn adaptations_of(&self, period: PeriodId, kind: TrackKind) -> Vec<&Adaptation> {
        let Some(period) = self.period(period) else {
            return Vec::new();
        };
        period
            .adaptations
            .iter()
            .filter_map(|id| self.adaptations.get(id))
            .filter(|a| a.kind == kind)
            .collect()
    }

    /// Representations of `adaptation`, ascending bitrate.
    #[must_use]
    pub fn representations_of(&self, adaptation: AdaptationId) -> Vec<&Representation> {
        let Some(adaptation) = self.adaptations.get(&adaptation) else {
            return Vec::new();
        };
        adaptation
            .representations
            .iter()
            .filter_map(|id| self.representations.get(id))
            .collect()
    }

    /// Representations of `adaptation` not known to be undecipherable.
    #[must_use]
    pub fn playable_representations_of(&self, adaptation: AdaptationId) -> Vec<&Representation> {
        let decipherability = self.decipherability.read();
        self.representations_of(adaptation)
            .into_iter()
            .filter(|r| decipherability.get(&r.id).copied() != Some(false))
            .collect()
    }

    /// Decipherability of a representation. `None` means unknown.
    #[must_use]
    pub fn decipherable(&self, id: RepresentationId) -> Option<bool> {
        self.decipherability.read().get(&id).copied()
    }

    /// Apply decipherability updates from the DRM supervisor.
    ///
    /// Returns the representations whose flag actually changed; the same list
    /// is broadcast to [`decipherability_updates`](Self::decipherability_updates)
    /// subscribers.
    pub fn update_decipherability(&self, updates: &[(RepresentationId, bool)]) -> Vec<RepresentationId> {
        let mut changed = Vec::new();
        {
            let mut map = self.decipherability.write();
            for &(id, value) in updates {
                if self.representations.contains_key(&id)
                    && map.insert(id, value) != Some(value)
                {
                    changed.push(id);
                }
            }
        }
        if !changed.is_empty() {
            let _ = self.decipherability_tx.send(changed.clone());
        }
        changed
    }

    /// Subscribe to decipherability changes.
    #[must_use]
    pub fn decipherability_updates(&self) -> broadcast::Receiver<Vec<RepresentationId>> {
        self.decipherability_tx.subscribe()
    }

    /// Replace a period in place after a manifest refresh.
    ///
    /// Returns `false` when no period with that id exists.
    pub fn update_period(&mut self, period: Period) -> bool {
        match self.periods.iter_mut().find(|p| p.id == period.id) {
            Some(slot) => {
                *slot = period;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("periods", &self.periods.len())
            .field("adaptations", &self.adaptations.len())
            .field("representations", &self.representations.len())
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::TimelineIndex;

    fn rep(id: u32, bitrate: u64, codec: &str) -> Representation {
        let base = Url::parse("https://cdn.example/rep/").unwrap();
        Representation {
            id: RepresentationId(id),
            bitrate,
            codec: codec.to_string(),
            mime: "video/mp4".to_string(),
            index: Arc::new(TimelineIndex::uniform(&base, 0.0, 4.0, 5, None)),
        }
    }

    fn manifest() -> Manifest {
        let adaptation = Adaptation {
            id: AdaptationId(0),
            kind: TrackKind::Video,
            representations: vec![RepresentationId(0), RepresentationId(1)],
            language: None,
        };
        let period = Period {
            id: PeriodId(0),
            start: 0.0,
            end: Some(20.0),
            adaptations: vec![AdaptationId(0)],
        };
        Manifest::new(
            vec![period],
            vec![adaptation],
            vec![rep(0, 300_000, "avc1.4d401e"), rep(1, 800_000, "avc1.4d401e")],
            Some(20.0),
        )
    }

    #[test]
    fn period_at_respects_bounds() {
        let m = manifest();
        assert!(m.period_at(0.0).is_some());
        assert!(m.period_at(19.9).is_some());
        assert!(m.period_at(20.0).is_none());
    }

    #[test]
    fn representations_listed_by_adaptation() {
        let m = manifest();
        let reps = m.representations_of(AdaptationId(0));
        assert_eq!(reps.len(), 2);
        assert_eq!(reps[0].bitrate, 300_000);
    }

    #[test]
    fn undecipherable_representations_are_filtered() {
        let m = manifest();
        let changed = m.update_decipherability(&[(RepresentationId(1), false)]);
        assert_eq!(changed, vec![RepresentationId(1)]);

        let playable = m.playable_representations_of(AdaptationId(0));
        assert_eq!(playable.len(), 1);
        assert_eq!(playable[0].id, RepresentationId(0));
    }

    #[test]
    fn redundant_decipherability_update_is_silent() {
        let m = manifest();
        m.update_decipherability(&[(RepresentationId(1), false)]);
        let changed = m.update_decipherability(&[(RepresentationId(1), false)]);
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn decipherability_update_is_broadcast() {
        let m = manifest();
        let mut rx = m.decipherability_updates();
        m.update_decipherability(&[(RepresentationId(0), true)]);
        let changed = rx.recv().await.unwrap();
        assert_eq!(changed, vec![RepresentationId(0)]);
    }

    #[test]
    fn update_period_replaces_by_id() {
        let mut m = manifest();
        let ok = m.update_period(Period {
            id: PeriodId(0),
            start: 0.0,
            end: Some(40.0),
            adaptations: vec![AdaptationId(0)],
        });
        assert!(ok);
        assert_eq!(m.period(PeriodId(0)).unwrap().end, Some(40.0));

        let missing = m.update_period(Period {
            id: PeriodId(9),
            start: 0.0,
            end: None,
            adaptations: vec![],
        });
        assert!(!missing);
    }
}

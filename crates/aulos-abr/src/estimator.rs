use std::collections::HashMap;

use aulos_media::RepresentationId;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    AbrDecision, AbrOptions, BandwidthEstimator, BufferBasedChooser, PlaybackSignal,
    RepresentationInfo, RequestProgress, ScoreCalculator, ThroughputSample,
};

/// The highest-bitrate representation with `bitrate <= target`, after
/// clamping `target` into `[min, max]`. Falls back to the lowest
/// representation, so the result is only `None` for an empty ladder.
///
/// Monotone non-decreasing in `target` and idempotent by construction.
#[must_use]
pub fn select_optimal(
    ladder: &[RepresentationInfo],
    target: u64,
    min: u64,
    max: u64,
) -> Option<RepresentationInfo> {
    let clamped = target.min(max).max(min);
    ladder
        .iter()
        .filter(|r| r.bitrate <= clamped)
        .max_by_key(|r| r.bitrate)
        .or_else(|| ladder.iter().min_by_key(|r| r.bitrate))
        .copied()
}

struct Inflight {
    progress: Option<RequestProgress>,
}

struct Inner {
    options: AbrOptions,
    /// Ascending by bitrate.
    ladder: Vec<RepresentationInfo>,
    bandwidth: BandwidthEstimator,
    scores: ScoreCalculator,
    buffer_chooser: BufferBasedChooser,
    playback: PlaybackSignal,
    /// Representation currently being played, updated by the stream layer
    /// once a switch actually lands.
    current: Option<RepresentationInfo>,
    /// Bandwidth-only mode: when the buffer runs low, occupancy-based
    /// optimism is ignored until the buffer has demonstrably recovered.
    force_bandwidth_mode: bool,
    inflight: HashMap<u64, Inflight>,
}

/// Produces an [`AbrDecision`] whenever any input changes.
///
/// Inputs arrive through the `add_*`/`note_*`/`on_playback` methods; the
/// latest decision is always readable and observable through
/// [`subscribe`](Self::subscribe).
pub struct AbrEstimator {
    inner: Mutex<Inner>,
    decision_tx: watch::Sender<AbrDecision>,
}

impl AbrEstimator {
    /// `ladder` is the playable representation set; it does not need to be
    /// sorted.
    #[must_use]
    pub fn new(mut ladder: Vec<RepresentationInfo>, options: AbrOptions) -> Self {
        ladder.sort_by_key(|r| r.bitrate);

        let bandwidth = BandwidthEstimator::new(&options);
        let scores = ScoreCalculator::new(&options);
        let buffer_chooser = BufferBasedChooser::new(ladder.clone());

        let initial_target = options.initial_bitrate.unwrap_or(0);
        let initial = select_optimal(
            &ladder,
            initial_target,
            options.min_auto_bitrate,
            options.max_auto_bitrate,
        );

        let initial_decision = AbrDecision {
            representation: initial.map_or(RepresentationId(0), |r| r.id),
            bitrate: initial.map_or(0, |r| r.bitrate),
            bitrate_estimate: options.initial_bitrate,
            urgent: false,
            manual: false,
            stable_bitrate_hint: None,
        };
        let (decision_tx, _) = watch::channel(initial_decision);

        Self {
            inner: Mutex::new(Inner {
                options,
                ladder,
                bandwidth,
                scores,
                buffer_chooser,
                playback: PlaybackSignal::default(),
                current: initial,
                force_bandwidth_mode: true,
                inflight: HashMap::new(),
            }),
            decision_tx,
        }
    }

    /// Observe decisions. The receiver immediately sees the latest one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AbrDecision> {
        self.decision_tx.subscribe()
    }

    /// Latest decision.
    #[must_use]
    pub fn current_decision(&self) -> AbrDecision {
        *self.decision_tx.borrow()
    }

    /// Feed a completed-transfer throughput sample from the fetcher.
    pub fn add_bandwidth_sample(&self, sample: ThroughputSample) {
        let mut inner = self.inner.lock();
        inner.bandwidth.add_sample(sample);
        self.recompute(&mut inner);
    }

    /// Feed a completed-segment score sample.
    pub fn add_score_sample(
        &self,
        representation: RepresentationId,
        segment_duration: f64,
        request_duration: f64,
    ) {
        let mut inner = self.inner.lock();
        inner
            .scores
            .add_sample(representation, segment_duration, request_duration);
        self.recompute(&mut inner);
    }

    /// Feed the latest playback state from the clock.
    pub fn on_playback(&self, signal: PlaybackSignal) {
        let mut inner = self.inner.lock();
        // Hysteresis: flip on at a low gap, off only once the buffer has
        // genuinely recovered. Prevents mode oscillation around one
        // threshold.
        if signal.buffer_gap <= inner.options.low_buffer_gap {
            if !inner.force_bandwidth_mode {
                debug!(buffer_gap = signal.buffer_gap, "entering bandwidth-only mode");
            }
            inner.force_bandwidth_mode = true;
        } else if signal.buffer_gap.is_finite()
            && signal.buffer_gap > inner.options.high_buffer_gap
        {
            if inner.force_bandwidth_mode {
                debug!(buffer_gap = signal.buffer_gap, "leaving bandwidth-only mode");
            }
            inner.force_bandwidth_mode = false;
        }
        inner.playback = signal;
        self.recompute(&mut inner);
    }

    /// The stream layer reports which representation playback actually uses.
    pub fn set_current(&self, representation: RepresentationId) {
        let mut inner = self.inner.lock();
        inner.current = inner.ladder.iter().find(|r| r.id == representation).copied();
        self.recompute(&mut inner);
    }

    /// Manual bitrate override; negative returns to automatic mode.
    pub fn set_manual_bitrate(&self, bitrate: i64) {
        let mut inner = self.inner.lock();
        inner.options.manual_bitrate = bitrate;
        self.recompute(&mut inner);
    }

    /// Adjust the automatic-selection bounds.
    pub fn set_bounds(&self, min: u64, max: u64) {
        let mut inner = self.inner.lock();
        inner.options.min_auto_bitrate = min;
        inner.options.max_auto_bitrate = max;
        self.recompute(&mut inner);
    }

    /// Replace the playable ladder (track switch, decipherability change).
    pub fn update_ladder(&self, mut ladder: Vec<RepresentationInfo>) {
        ladder.sort_by_key(|r| r.bitrate);
        let mut inner = self.inner.lock();
        inner.buffer_chooser.update_ladder(ladder.clone());
        if let Some(current) = inner.current {
            inner.current = ladder.iter().find(|r| r.id == current.id).copied();
        }
        inner.ladder = ladder;
        self.recompute(&mut inner);
    }

    /// Track an in-flight request for urgency and estimate capping.
    pub fn note_request_begin(&self, request_id: u64) {
        let mut inner = self.inner.lock();
        inner.inflight.insert(request_id, Inflight { progress: None });
        self.recompute(&mut inner);
    }

    pub fn note_request_progress(&self, request_id: u64, progress: RequestProgress) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.inflight.get_mut(&request_id) {
            slot.progress = Some(progress);
        }
    }

    pub fn note_request_end(&self, request_id: u64) {
        let mut inner = self.inner.lock();
        inner.inflight.remove(&request_id);
        self.recompute(&mut inner);
    }

    /// Drop bandwidth history (e.g. after a network-interface change).
    pub fn reset_bandwidth(&self) {
        let mut inner = self.inner.lock();
        inner.bandwidth.reset();
        self.recompute(&mut inner);
    }

    fn recompute(&self, inner: &mut Inner) {
        let decision = Self::compute_decision(inner);
        self.decision_tx.send_if_modified(|slot| {
            if *slot == decision {
                false
            } else {
                *slot = decision;
                true
            }
        });
    }

    fn compute_decision(inner: &Inner) -> AbrDecision {
        let options = &inner.options;
        let previous = inner.current;

        // Manual override bypasses everything and always applies urgently.
        if options.manual_bitrate >= 0 {
            let chosen = select_optimal(
                &inner.ladder,
                options.manual_bitrate.unsigned_abs(),
                0,
                u64::MAX,
            );
            return AbrDecision {
                representation: chosen.map_or(RepresentationId(0), |r| r.id),
                bitrate: chosen.map_or(0, |r| r.bitrate),
                bitrate_estimate: None,
                urgent: true,
                manual: true,
                stable_bitrate_hint: None,
            };
        }

        let estimate = inner.bandwidth.estimate_bps();
        let bitrate_chosen = Self::cap_by_inflight(inner, estimate);

        let chosen_by_bandwidth = select_optimal(
            &inner.ladder,
            bitrate_chosen.unwrap_or(0),
            options.min_auto_bitrate,
            options.max_auto_bitrate,
        );

        let current_bitrate = previous.map(|r| r.bitrate);
        let current_score = previous.and_then(|r| inner.scores.score(r.id));
        let buffer_based = inner.buffer_chooser.choose(
            inner.playback.buffer_gap,
            current_bitrate,
            current_score,
            inner.playback.speed,
        );

        let chosen = match (inner.force_bandwidth_mode, buffer_based, chosen_by_bandwidth) {
            (true, _, bandwidth) | (_, None, bandwidth) => bandwidth,
            (false, Some(buffered), Some(bandwidth)) if buffered >= bandwidth.bitrate => {
                Some(bandwidth)
            }
            (false, Some(buffered), _) => select_optimal(
                &inner.ladder,
                buffered,
                options.min_auto_bitrate,
                options.max_auto_bitrate,
            ),
        };

        let Some(chosen) = chosen else {
            return AbrDecision {
                representation: previous.map_or(RepresentationId(0), |r| r.id),
                bitrate: previous.map_or(0, |r| r.bitrate),
                bitrate_estimate: estimate,
                urgent: false,
                manual: false,
                stable_bitrate_hint: None,
            };
        };

        let downward = current_bitrate.is_some_and(|current| chosen.bitrate < current);
        let urgent = downward && Self::starvation_risk(inner, estimate);

        let speed = inner.playback.speed.max(1.0);
        let stable_bitrate_hint = inner
            .scores
            .last_stable_representation(&inner.ladder)
            .map(|r| (r.bitrate as f64 / speed).round() as u64);

        AbrDecision {
            representation: chosen.id,
            bitrate: chosen.bitrate,
            bitrate_estimate: bitrate_chosen,
            urgent,
            manual: false,
            stable_bitrate_hint,
        }
    }

    /// An in-flight request already observed to be slower than the estimate
    /// caps it: its best-case completion bandwidth is what we are actually
    /// getting right now.
    fn cap_by_inflight(inner: &Inner, estimate: Option<u64>) -> Option<u64> {
        let mut capped = estimate?;
        for request in inner.inflight.values() {
            let Some(progress) = request.progress else {
                continue;
            };
            if progress.elapsed < inner.options.min_inflight_elapsed || progress.loaded == 0 {
                continue;
            }
            let observed = (progress.loaded as f64 * 8.0 / progress.elapsed.as_secs_f64()) as u64;
            if observed < capped {
                capped = observed;
            }
        }
        Some(capped)
    }

    /// Whether finishing the in-flight downloads at the current estimate
    /// would outlast the buffer.
    fn starvation_risk(inner: &Inner, estimate: Option<u64>) -> bool {
        let Some(bps) = estimate.filter(|&b| b > 0) else {
            return false;
        };
        let gap = inner.playback.buffer_gap;
        if !gap.is_finite() {
            return false;
        }
        inner.inflight.values().any(|request| {
            let Some(progress) = request.progress else {
                return false;
            };
            let Some(total) = progress.total else {
                return false;
            };
            let remaining_bits = total.saturating_sub(progress.loaded) as f64 * 8.0;
            remaining_bits / bps as f64 > gap
        })
    }
}

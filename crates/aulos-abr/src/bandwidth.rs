use crate::{AbrOptions, ThroughputSample, ThroughputSampleSource};

/// Sample-weighted exponential moving average with a configurable half-life.
#[derive(Clone, Debug)]
pub(crate) struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    pub(crate) fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    pub(crate) fn add_sample(&mut self, weight: f64, value: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        self.last_estimate = value * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight.max(0.0);
    }

    pub(crate) fn estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            // Correct the zero-start bias while the window is still filling.
            let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
            self.last_estimate / zero_factor.max(1e-6)
        }
    }

    pub(crate) fn has_samples(&self) -> bool {
        self.total_weight > 0.0
    }
}

/// Network throughput estimator over two EWMA windows.
///
/// The short window reacts to change, the long window rides out bursts; the
/// reported estimate is the larger of the two so one slow segment does not
/// crater quality on its own. Undersized or cache-served samples are
/// ignored.
#[derive(Clone, Debug)]
pub struct BandwidthEstimator {
    fast: Ewma,
    slow: Ewma,
    initial_bps: Option<u64>,
    min_sample_duration: std::time::Duration,
    min_sample_bytes: u64,
}

impl BandwidthEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;

    #[must_use]
    pub fn new(options: &AbrOptions) -> Self {
        Self {
            fast: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
            initial_bps: options.initial_bitrate,
            min_sample_duration: options.min_sample_duration,
            min_sample_bytes: options.min_sample_bytes,
        }
    }

    pub fn add_sample(&mut self, sample: ThroughputSample) {
        if !matches!(sample.source, ThroughputSampleSource::Network) {
            return;
        }
        if sample.bytes < self.min_sample_bytes || sample.duration < self.min_sample_duration {
            return;
        }

        let secs = sample.duration.as_secs_f64();
        let bps = sample.bytes as f64 * 8.0 / secs;
        self.fast.add_sample(secs, bps);
        self.slow.add_sample(secs, bps);
    }

    /// Estimated throughput in bits per second.
    ///
    /// Falls back to the configured initial bitrate before any sample has
    /// been accepted.
    #[must_use]
    pub fn estimate_bps(&self) -> Option<u64> {
        if self.fast.has_samples() {
            let est = self.fast.estimate().max(self.slow.estimate());
            (est > 0.0).then(|| est.round() as u64)
        } else {
            self.initial_bps
        }
    }

    /// Drop all accumulated samples, keeping the initial-bitrate seed.
    pub fn reset(&mut self) {
        self.fast = Ewma::new(Self::FAST_HALF_LIFE_SECS);
        self.slow = Ewma::new(Self::SLOW_HALF_LIFE_SECS);
    }
}

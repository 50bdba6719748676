use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

/// CDN scoring configuration.
#[derive(Clone, Debug)]
pub struct CdnOptions {
    /// How long a failed CDN stays downranked.
    pub failure_cooldown: Duration,
}

impl Default for CdnOptions {
    fn default() -> Self {
        Self {
            failure_cooldown: Duration::from_secs(60),
        }
    }
}

/// Stable identity of a CDN: host plus port.
///
/// Ports matter: test rigs and multi-origin setups run distinct CDNs on one
/// host.
#[must_use]
pub fn origin_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or(""),
        url.port_or_known_default().unwrap_or(0)
    )
}

#[derive(Clone, Debug)]
struct CdnScore {
    /// Moving success/latency score in `[0, 1]`; higher is better.
    score: f64,
    downranked_until: Option<Instant>,
}

impl Default for CdnScore {
    fn default() -> Self {
        Self {
            score: 0.5,
            downranked_until: None,
        }
    }
}

/// Orders candidate CDN URLs for a segment by observed quality.
///
/// Scores move with each report: successes pull toward a latency-derived
/// quality, failures halve the score and downrank the host for a cooldown.
/// Scoped per fetcher; nothing global.
pub struct CdnPrioritizer {
    options: CdnOptions,
    scores: Mutex<HashMap<String, CdnScore>>,
}

impl CdnPrioritizer {
    #[must_use]
    pub fn new(options: CdnOptions) -> Self {
        Self {
            options,
            scores: Mutex::new(HashMap::new()),
        }
    }

    fn host_key(url: &Url) -> String {
        origin_key(url)
    }

    /// Candidate URLs ordered best-first: healthy hosts by descending
    /// score, then downranked hosts (still usable as a last resort).
    #[must_use]
    pub fn sort_candidates(&self, candidates: &[Url]) -> Vec<Url> {
        let now = Instant::now();
        let scores = self.scores.lock();

        let mut keyed: Vec<(bool, f64, usize)> = candidates
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let entry = scores.get(&Self::host_key(url)).cloned().unwrap_or_default();
                let downranked = entry.downranked_until.is_some_and(|until| until > now);
                (downranked, entry.score, i)
            })
            .collect();

        // Stable order: manifest order breaks score ties.
        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        keyed
            .into_iter()
            .map(|(_, _, i)| candidates[i].clone())
            .collect()
    }

    /// Record a successful transfer and how long it took.
    pub fn report_success(&self, url: &Url, latency: Duration) {
        let quality = 1.0 / (1.0 + latency.as_secs_f64());
        let mut scores = self.scores.lock();
        let entry = scores.entry(Self::host_key(url)).or_default();
        entry.score = entry.score * 0.7 + quality * 0.3;
        entry.downranked_until = None;
    }

    /// Record a failed transfer: halve the score and downrank for the
    /// cooldown.
    pub fn report_failure(&self, url: &Url) {
        let mut scores = self.scores.lock();
        let entry = scores.entry(Self::host_key(url)).or_default();
        entry.score *= 0.5;
        entry.downranked_until = Some(Instant::now() + self.options.failure_cooldown);
        debug!(host = %Self::host_key(url), score = entry.score, "CDN downranked");
    }

    /// Current score for a URL's host (for diagnostics and tests).
    #[must_use]
    pub fn score_of(&self, url: &Url) -> f64 {
        self.scores
            .lock()
            .get(&Self::host_key(url))
            .map_or(0.5, |e| e.score)
    }
}

use std::{collections::HashSet, sync::Arc};

use aulos_media::RepresentationId;
use aulos_ranges::TimeRanges;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{AppendParams, SegmentSink, SinkError, SinkResult};

/// Queue policy.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    /// Seconds behind the playhead that quota eviction must preserve.
    pub protected_behind: f64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            protected_behind: 10.0,
        }
    }
}

/// FIFO operation queue over one [`SegmentSink`].
///
/// All engine-side sink access goes through here: operations execute
/// strictly in submission order (the internal lock is fair), init-segment
/// bookkeeping lives here, and quota pressure triggers one eviction plus
/// one re-attempt before surfacing the error.
pub struct SinkQueue {
    sink: Arc<dyn SegmentSink>,
    options: QueueOptions,
    /// Fair async lock: serializes operations in acquisition order.
    op_lock: tokio::sync::Mutex<()>,
    init_appended: Mutex<HashSet<RepresentationId>>,
}

impl SinkQueue {
    #[must_use]
    pub fn new(sink: Arc<dyn SegmentSink>, options: QueueOptions) -> Self {
        Self {
            sink,
            options,
            op_lock: tokio::sync::Mutex::new(()),
            init_appended: Mutex::new(HashSet::new()),
        }
    }

    /// Whether this representation's init segment has been appended.
    #[must_use]
    pub fn has_init(&self, representation: RepresentationId) -> bool {
        self.init_appended.lock().contains(&representation)
    }

    /// Append an init segment and record it for `representation`.
    pub async fn append_init(
        &self,
        representation: RepresentationId,
        data: Bytes,
        params: AppendParams,
    ) -> SinkResult<()> {
        let _guard = self.op_lock.lock().await;
        self.append_with_quota_recovery(data, params, None).await?;
        self.init_appended.lock().insert(representation);
        Ok(())
    }

    /// Append media data. `playhead` guides quota eviction.
    pub async fn append_media(
        &self,
        data: Bytes,
        params: AppendParams,
        playhead: f64,
    ) -> SinkResult<()> {
        let _guard = self.op_lock.lock().await;
        self.append_with_quota_recovery(data, params, Some(playhead))
            .await
    }

    /// Remove `[start, end)` from the sink.
    pub async fn remove(&self, start: f64, end: f64) -> SinkResult<()> {
        let _guard = self.op_lock.lock().await;
        self.sink.remove(start, end).await
    }

    /// Signal end of stream.
    pub async fn end_of_stream(&self) -> SinkResult<()> {
        let _guard = self.op_lock.lock().await;
        self.sink.end_of_stream().await
    }

    /// Currently buffered ranges.
    #[must_use]
    pub fn buffered(&self) -> TimeRanges {
        self.sink.buffered()
    }

    /// Forget init state (codec change tears the sink down logically).
    pub fn reset_init_state(&self) {
        self.init_appended.lock().clear();
    }

    /// Append; on quota pressure evict the oldest buffered history outside
    /// the protected window and re-attempt once.
    async fn append_with_quota_recovery(
        &self,
        data: Bytes,
        params: AppendParams,
        playhead: Option<f64>,
    ) -> SinkResult<()> {
        match self.sink.append(data.clone(), params.clone()).await {
            Err(SinkError::QuotaExceeded) => {
                let Some(evict) = self.eviction_range(playhead) else {
                    return Err(SinkError::QuotaExceeded);
                };
                warn!(
                    start = evict.0,
                    end = evict.1,
                    "sink quota exceeded, evicting history"
                );
                self.sink.remove(evict.0, evict.1).await?;
                self.sink.append(data, params).await
            }
            other => other,
        }
    }

    /// Oldest buffered range, clipped to end before the protected window.
    fn eviction_range(&self, playhead: Option<f64>) -> Option<(f64, f64)> {
        let playhead = playhead?;
        let buffered = self.sink.buffered();
        let oldest = buffered.as_slice().first()?;
        let end = oldest.end.min(playhead - self.options.protected_behind);
        if end <= oldest.start {
            debug!("no evictable history outside the protected window");
            return None;
        }
        Some((oldest.start, end))
    }
}

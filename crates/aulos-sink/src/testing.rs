//! In-memory sink for tests and examples.

use std::collections::VecDeque;

use async_trait::async_trait;
use aulos_ranges::{TimeRange, TimeRanges};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{AppendParams, SegmentSink, SinkError, SinkResult};

/// One recorded append.
#[derive(Clone, Debug)]
pub struct RecordedAppend {
    pub data: Bytes,
    pub params: AppendParams,
}

#[derive(Default)]
struct State {
    appends: Vec<RecordedAppend>,
    buffered: TimeRanges,
    ended: bool,
    scripted_errors: VecDeque<SinkError>,
    /// Codecs this sink accepts; empty accepts everything.
    supported_codecs: Vec<String>,
}

/// Records appends and tracks buffered ranges from the parser-provided
/// `time_range`. Scriptable failures for error-path tests.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<State>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted codecs (prefix match, so `avc1` covers profiles).
    #[must_use]
    pub fn with_supported_codecs(codecs: &[&str]) -> Self {
        let sink = Self::new();
        sink.state.lock().supported_codecs =
            codecs.iter().map(|c| (*c).to_string()).collect();
        sink
    }

    /// Queue an error for the next append.
    pub fn push_error(&self, error: SinkError) {
        self.state.lock().scripted_errors.push_back(error);
    }

    #[must_use]
    pub fn appends(&self) -> Vec<RecordedAppend> {
        self.state.lock().appends.clone()
    }

    #[must_use]
    pub fn appended_bytes(&self) -> u64 {
        self.state
            .lock()
            .appends
            .iter()
            .map(|a| a.data.len() as u64)
            .sum()
    }

    #[must_use]
    pub fn ended(&self) -> bool {
        self.state.lock().ended
    }
}

#[async_trait]
impl SegmentSink for MemorySink {
    async fn append(&self, data: Bytes, params: AppendParams) -> SinkResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.scripted_errors.pop_front() {
            return Err(error);
        }
        if !state.supported_codecs.is_empty()
            && !state
                .supported_codecs
                .iter()
                .any(|c| params.codec.starts_with(c.as_str()))
        {
            return Err(SinkError::CodecRejected(params.codec.clone()));
        }
        if let Some((start, end)) = params.time_range {
            state.buffered.insert(TimeRange::new(start, end));
        }
        state.appends.push(RecordedAppend { data, params });
        Ok(())
    }

    async fn remove(&self, start: f64, end: f64) -> SinkResult<()> {
        self.state.lock().buffered.exclude(TimeRange::new(start, end));
        Ok(())
    }

    async fn end_of_stream(&self) -> SinkResult<()> {
        self.state.lock().ended = true;
        Ok(())
    }

    fn buffered(&self) -> TimeRanges {
        self.state.lock().buffered.clone()
    }
}

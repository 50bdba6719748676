use aulos_media::{RepresentationId, SegmentInfo};
use bytes::Bytes;

use crate::{PrioritySteps, StreamResult};

/// Inputs the transport parser gets alongside the raw bytes.
#[derive(Clone, Debug)]
pub struct ParseContext {
    pub representation: RepresentationId,
    pub segment: SegmentInfo,
}

/// Output of transport-specific segment parsing.
#[derive(Clone, Debug)]
pub enum ParsedSegment {
    Init {
        initialization_data: Bytes,
        /// Timescale found in the init segment, forwarded to media parses.
        init_timescale: Option<u32>,
        /// Protection metadata (`pssh` and friends) found while parsing.
        protection_update: Option<Vec<u8>>,
    },
    Media {
        data: Bytes,
        /// Presentation interval of this chunk, when the parser knows it.
        time_range: Option<(f64, f64)>,
        /// Offset to apply to timestamps inside the data.
        time_offset: f64,
        /// Append window `[start, end]` for the sink.
        append_window: (Option<f64>, Option<f64>),
        protection_update: Option<Vec<u8>>,
    },
}

/// Transport-specific segment parser.
///
/// The engine never interprets media bytes itself; the transport (DASH,
/// HLS, test fixtures) provides this.
pub trait SegmentParser: Send + Sync {
    fn parse_init(&self, data: Bytes, context: &ParseContext) -> StreamResult<ParsedSegment>;

    fn parse_media(
        &self,
        data: Bytes,
        context: &ParseContext,
        init_timescale: Option<u32>,
    ) -> StreamResult<ParsedSegment>;
}

/// Parser for transports whose segments need no rewriting: media intervals
/// come from the segment index, bytes pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughParser;

impl SegmentParser for PassthroughParser {
    fn parse_init(&self, data: Bytes, _context: &ParseContext) -> StreamResult<ParsedSegment> {
        Ok(ParsedSegment::Init {
            initialization_data: data,
            init_timescale: None,
            protection_update: None,
        })
    }

    fn parse_media(
        &self,
        data: Bytes,
        context: &ParseContext,
        _init_timescale: Option<u32>,
    ) -> StreamResult<ParsedSegment> {
        Ok(ParsedSegment::Media {
            data,
            time_range: Some((context.segment.start, context.segment.end())),
            time_offset: context.segment.time_offset,
            append_window: (None, None),
            protection_update: None,
        })
    }
}

/// Stream-controller configuration.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Garbage-collect buffer further than this behind the playhead.
    pub max_buffer_behind: Option<f64>,
    /// Garbage-collect buffer further than this ahead of the playhead.
    pub max_buffer_ahead: Option<f64>,
    /// Distance-to-priority mapping for segment requests.
    pub priority_steps: PrioritySteps,
    /// Seconds of already-buffered data a clean-buffer switch keeps ahead
    /// of the playhead.
    pub switch_margin: f64,
    /// Position jumps beyond this many seconds past the in-flight segment
    /// cancel the request.
    pub jump_cancel_margin: f64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_buffer_behind: None,
            max_buffer_ahead: None,
            priority_steps: PrioritySteps::default(),
            switch_margin: 1.0,
            jump_cancel_margin: 2.0,
        }
    }
}

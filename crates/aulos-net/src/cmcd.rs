//! Common Media Client Data (CTA-5004) request decoration.
//!
//! Carries the client's view of playback (`br`, `bl`, `mtp`, `ot`, `sid`)
//! to the CDN, either as a `CMCD` query argument or as the three standard
//! request headers.

use url::Url;

use crate::types::Headers;

/// Where the CMCD payload goes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CmcdMode {
    #[default]
    QueryString,
    Headers,
}

/// CMCD configuration. Absent options mean no decoration at all.
#[derive(Clone, Debug)]
pub struct CmcdOptions {
    pub mode: CmcdMode,
    /// Session id (`sid`), constant for one playback session.
    pub session_id: String,
}

/// Media object type (`ot` key).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmcdObjectType {
    AudioOnly,
    VideoOnly,
    MuxedAudioVideo,
    InitSegment,
    CaptionOrSubtitle,
}

impl CmcdObjectType {
    fn key(self) -> &'static str {
        match self {
            Self::AudioOnly => "a",
            Self::VideoOnly => "v",
            Self::MuxedAudioVideo => "av",
            Self::InitSegment => "i",
            Self::CaptionOrSubtitle => "c",
        }
    }
}

/// Per-request payload values.
#[derive(Clone, Debug)]
pub struct CmcdPayload {
    /// Encoded bitrate of the requested object, kilobits per second.
    pub bitrate_kbps: Option<u64>,
    /// Buffer length ahead of the playhead, milliseconds.
    pub buffer_length_ms: Option<u64>,
    /// Measured throughput, kilobits per second.
    pub measured_throughput_kbps: Option<u64>,
    pub object_type: Option<CmcdObjectType>,
}

fn object_pairs(payload: &CmcdPayload) -> Vec<String> {
    let mut pairs = Vec::new();
    if let Some(br) = payload.bitrate_kbps {
        pairs.push(format!("br={br}"));
    }
    if let Some(ot) = payload.object_type {
        pairs.push(format!("ot={}", ot.key()));
    }
    pairs
}

fn request_pairs(payload: &CmcdPayload) -> Vec<String> {
    let mut pairs = Vec::new();
    if let Some(bl) = payload.buffer_length_ms {
        // CMCD rounds buffer length to the nearest 100 ms.
        pairs.push(format!("bl={}", (bl + 50) / 100 * 100));
    }
    if let Some(mtp) = payload.measured_throughput_kbps {
        pairs.push(format!("mtp={mtp}"));
    }
    pairs
}

fn session_pairs(options: &CmcdOptions) -> Vec<String> {
    vec![format!("sid=\"{}\"", options.session_id)]
}

/// Apply CMCD to a request, mutating the URL or the headers per the mode.
pub fn decorate(
    options: &CmcdOptions,
    payload: &CmcdPayload,
    url: &mut Url,
    headers: &mut Headers,
) {
    match options.mode {
        CmcdMode::QueryString => {
            let mut pairs = object_pairs(payload);
            pairs.extend(request_pairs(payload));
            pairs.extend(session_pairs(options));
            pairs.sort();
            url.query_pairs_mut().append_pair("CMCD", &pairs.join(","));
        }
        CmcdMode::Headers => {
            let object = object_pairs(payload);
            if !object.is_empty() {
                headers.insert("CMCD-Object", object.join(","));
            }
            let request = request_pairs(payload);
            if !request.is_empty() {
                headers.insert("CMCD-Request", request.join(","));
            }
            headers.insert("CMCD-Session", session_pairs(options).join(","));
        }
    }
}

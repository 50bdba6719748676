//! Segment and manifest fixtures.

use std::sync::Arc;

use aulos_media::{
    Adaptation, AdaptationId, Manifest, Period, PeriodId, Representation, RepresentationId,
    TimelineIndex, TrackKind,
};
use bytes::{BufMut, Bytes, BytesMut};
use url::Url;

fn push_box(out: &mut BytesMut, kind: &[u8; 4], payload: &[u8]) {
    out.put_u32((payload.len() + 8) as u32);
    out.put_slice(kind);
    out.put_slice(payload);
}

/// A minimal syntactically-valid ISOBMFF init segment: `ftyp` + `moov`.
#[must_use]
pub fn isobmff_init_segment() -> Bytes {
    let mut out = BytesMut::new();
    push_box(&mut out, b"ftyp", b"isom\x00\x00\x02\x00isomiso2");
    push_box(&mut out, b"moov", &[0u8; 64]);
    out.freeze()
}

/// A minimal ISOBMFF media segment: `pair_count` complete `moof`+`mdat`
/// pairs with `mdat_size` bytes of payload each.
#[must_use]
pub fn isobmff_media_segment(pair_count: usize, mdat_size: usize) -> Bytes {
    let mut out = BytesMut::new();
    for i in 0..pair_count {
        push_box(&mut out, b"moof", &[i as u8; 32]);
        push_box(&mut out, b"mdat", &vec![0xAB; mdat_size]);
    }
    out.freeze()
}

/// Cut a buffer short, producing a truncated final box.
#[must_use]
pub fn truncate(bytes: &Bytes, drop_tail: usize) -> Bytes {
    bytes.slice(0..bytes.len().saturating_sub(drop_tail))
}

/// `(RepresentationId, bitrate)` ladder of the given bitrates.
#[must_use]
pub fn ladder(bitrates: &[u64]) -> Vec<(RepresentationId, u64)> {
    bitrates
        .iter()
        .enumerate()
        .map(|(i, &b)| (RepresentationId(i as u32), b))
        .collect()
}

/// Uniform-duration index rooted at `base`.
#[must_use]
pub fn uniform_index(base: &Url, duration: f64, count: usize) -> Arc<TimelineIndex> {
    Arc::new(TimelineIndex::uniform(base, 0.0, duration, count, None))
}

/// Single-period manifest with one video adaptation over `bitrates`.
#[must_use]
pub fn single_period_manifest(base: &Url, bitrates: &[u64], duration: f64) -> Manifest {
    let segment_count = (duration / 4.0).ceil() as usize;
    let representations: Vec<Representation> = bitrates
        .iter()
        .enumerate()
        .map(|(i, &bitrate)| {
            let rep_base = base
                .join(&format!("rep-{i}/"))
                .expect("join representation base");
            Representation {
                id: RepresentationId(i as u32),
                bitrate,
                codec: "avc1.4d401e".to_string(),
                mime: "video/mp4".to_string(),
                index: Arc::new(TimelineIndex::uniform(&rep_base, 0.0, 4.0, segment_count, None)),
            }
        })
        .collect();

    let adaptation = Adaptation {
        id: AdaptationId(0),
        kind: TrackKind::Video,
        representations: representations.iter().map(|r| r.id).collect(),
        language: None,
    };
    let period = Period {
        id: PeriodId(0),
        start: 0.0,
        end: Some(duration),
        adaptations: vec![AdaptationId(0)],
    };
    Manifest::new(vec![period], vec![adaptation], representations, Some(duration))
}

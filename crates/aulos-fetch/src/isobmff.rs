//! Incremental ISOBMFF box scanning and container integrity checks.

use bytes::{Bytes, BytesMut};

use crate::{ContainerKind, FetchError, FetchResult};

/// Parsed top-level box header.
struct BoxHeader {
    kind: [u8; 4],
    /// Total box size including the header; `None` means "to end of file".
    size: Option<u64>,
    header_len: u64,
}

/// Parse one box header at `offset`. `Ok(None)` means more bytes needed.
fn parse_box_header(buf: &[u8], offset: usize) -> FetchResult<Option<BoxHeader>> {
    let rest = &buf[offset..];
    if rest.len() < 8 {
        return Ok(None);
    }
    let size32 = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let kind = [rest[4], rest[5], rest[6], rest[7]];

    match size32 {
        0 => Ok(Some(BoxHeader {
            kind,
            size: None,
            header_len: 8,
        })),
        1 => {
            if rest.len() < 16 {
                return Ok(None);
            }
            let size64 = u64::from_be_bytes([
                rest[8], rest[9], rest[10], rest[11], rest[12], rest[13], rest[14], rest[15],
            ]);
            if size64 < 16 {
                return Err(FetchError::Integrity(format!(
                    "invalid 64-bit box size {size64}"
                )));
            }
            Ok(Some(BoxHeader {
                kind,
                size: Some(size64),
                header_len: 16,
            }))
        }
        2..=7 => Err(FetchError::Integrity(format!(
            "invalid box size {size32}"
        ))),
        _ => Ok(Some(BoxHeader {
            kind,
            size: Some(u64::from(size32)),
            header_len: 8,
        })),
    }
}

/// Incremental splitter for low-latency MP4 delivery.
///
/// Feed network chunks in with [`push`](Self::push); complete `moof`+`mdat`
/// pairs come out as soon as their last byte arrives, so media can be
/// appended while the rest of the segment is still downloading. Boxes
/// between the pair (`styp`, `prft`, ...) travel with the chunk that closes
/// them.
#[derive(Debug, Default)]
pub struct BoxScanner {
    buf: BytesMut,
    /// Parse offset of the first byte not yet part of an emitted chunk.
    scan_offset: usize,
    /// Whether a `moof` was seen since the last emitted chunk.
    moof_seen: bool,
}

impl BoxScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every chunk completed by this push.
    pub fn push(&mut self, bytes: &[u8]) -> FetchResult<Vec<Bytes>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let Some(header) = parse_box_header(&self.buf, self.scan_offset)? else {
                break;
            };
            let Some(size) = header.size else {
                // Unbounded box: nothing more can be delimited until EOF.
                break;
            };
            if size < header.header_len {
                return Err(FetchError::Integrity(format!(
                    "box size {size} smaller than header"
                )));
            }
            let end = self.scan_offset as u64 + size;
            if end > self.buf.len() as u64 {
                break;
            }

            match &header.kind {
                b"moof" => self.moof_seen = true,
                b"mdat" if self.moof_seen => {
                    let chunk = self.buf.split_to(end as usize).freeze();
                    self.scan_offset = 0;
                    self.moof_seen = false;
                    out.push(chunk);
                    continue;
                }
                _ => {}
            }
            self.scan_offset = end as usize;
        }

        Ok(out)
    }

    /// Remaining bytes after the final push (trailing boxes, or the whole
    /// buffer when no pair completed).
    #[must_use]
    pub fn finish(self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.freeze())
        }
    }
}

/// Validate top-level container structure of a complete segment.
///
/// A segment whose final box is cut short was truncated in transit; the
/// request is failed with a retryable error. Containers we cannot parse are
/// accepted.
pub fn check_integrity(bytes: &[u8], container: ContainerKind) -> FetchResult<()> {
    match container {
        ContainerKind::Mp4 => check_isobmff(bytes),
        ContainerKind::WebM => check_ebml(bytes),
        ContainerKind::MpegTs | ContainerKind::Unknown => Ok(()),
    }
}

fn check_isobmff(bytes: &[u8]) -> FetchResult<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match parse_box_header(bytes, offset)? {
            None => {
                return Err(FetchError::Integrity(format!(
                    "truncated box header at offset {offset}"
                )));
            }
            Some(header) => {
                let Some(size) = header.size else {
                    // Box running to EOF is complete by definition.
                    return Ok(());
                };
                if size < header.header_len {
                    return Err(FetchError::Integrity(format!(
                        "box size {size} smaller than header"
                    )));
                }
                let end = offset as u64 + size;
                if end > bytes.len() as u64 {
                    return Err(FetchError::Integrity(format!(
                        "box {} truncated: needs {end} bytes, have {}",
                        String::from_utf8_lossy(&header.kind),
                        bytes.len()
                    )));
                }
                offset = end as usize;
            }
        }
    }
    Ok(())
}

/// Read an EBML variable-length integer, returning `(value, length)`.
/// `None` value means the reserved "unknown size".
fn parse_vint(bytes: &[u8], offset: usize) -> Option<(Option<u64>, usize)> {
    let first = *bytes.get(offset)?;
    if first == 0 {
        return None;
    }
    let len = first.leading_zeros() as usize + 1;
    if offset + len > bytes.len() {
        return None;
    }

    let mut value = u64::from(first) & (0xFF >> len);
    let mut all_ones = value == (0xFF >> len) as u64;
    for i in 1..len {
        let b = bytes[offset + i];
        value = (value << 8) | u64::from(b);
        all_ones = all_ones && b == 0xFF;
    }
    Some((if all_ones { None } else { Some(value) }, len))
}

fn check_ebml(bytes: &[u8]) -> FetchResult<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        // Element ID, then size, both vints.
        let Some((_, id_len)) = parse_vint(bytes, offset) else {
            return Err(FetchError::Integrity(format!(
                "truncated EBML id at offset {offset}"
            )));
        };
        let Some((size, size_len)) = parse_vint(bytes, offset + id_len) else {
            return Err(FetchError::Integrity(format!(
                "truncated EBML size at offset {offset}"
            )));
        };
        let Some(size) = size else {
            // Unknown-size element extends to EOF.
            return Ok(());
        };
        let end = offset + id_len + size_len + size as usize;
        if end > bytes.len() {
            return Err(FetchError::Integrity(format!(
                "EBML element truncated: needs {end} bytes, have {}",
                bytes.len()
            )));
        }
        offset = end;
    }
    Ok(())
}

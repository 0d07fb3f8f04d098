//! Random-access byte source for a PDF file.
//!
//! Locates the `%PDF-` header (tolerating leading junk) and exposes the
//! bytes rebased so that offset 0 is the first byte of the header.

use crate::error::{PdfError, Result};
use crate::parser::lexer::is_whitespace;
use bytes::Bytes;
use tracing::warn;

/// How far into the file the `%PDF-` header may appear.
pub const HEADER_SEARCH_WINDOW: usize = 1024;
/// How far from the end of the file `startxref` is searched first.
pub const STARTXREF_SEARCH_WINDOW: usize = 1024;

/// Header-relative view of the document bytes.
#[derive(Debug, Clone)]
pub struct PdfSource {
    data: Bytes,
    header_offset: usize,
    version: String,
}

impl PdfSource {
    pub fn new(raw: Bytes) -> Self {
        let window = &raw[..raw.len().min(HEADER_SEARCH_WINDOW)];
        let found = find(window, b"%PDF-", 0);
        let header_offset = match found {
            Some(0) => 0,
            Some(off) => {
                warn!(offset = off, "skipping junk before %PDF header");
                off
            }
            None => {
                warn!("no %PDF header found, reading bytes as-is");
                0
            }
        };
        let data = raw.slice(header_offset..);
        let version = if found.is_some() {
            let v: String = data[5..]
                .iter()
                .take_while(|&&b| b.is_ascii_digit() || b == b'.')
                .map(|&b| b as char)
                .collect();
            if v.is_empty() { "1.4".to_string() } else { v }
        } else {
            "1.4".to_string()
        };
        Self {
            data,
            header_offset,
            version,
        }
    }

    /// Header-relative bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of junk bytes in front of `%PDF-`.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// Version from the header, e.g. `"1.7"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Offset named by the last `startxref` in the file.
    pub fn find_startxref(&self) -> Result<usize> {
        let data = &self.data[..];
        let tail_start = data.len().saturating_sub(STARTXREF_SEARCH_WINDOW);
        let pos = rfind(&data[tail_start..], b"startxref")
            .map(|p| p + tail_start)
            .or_else(|| rfind(data, b"startxref"))
            .ok_or_else(|| PdfError::NoValidXRef("startxref not found".into()))?;

        let rest = &data[pos + b"startxref".len()..];
        let digits: String = rest
            .iter()
            .skip_while(|&&b| is_whitespace(b))
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();
        digits
            .parse::<usize>()
            .map_err(|_| PdfError::NoValidXRef("startxref has no offset".into()))
    }

    /// Slice the payload of a stream whose data begins at `start`.
    ///
    /// A declared length is trusted only when `endstream` follows it
    /// (after optional whitespace). Otherwise the length is recomputed by
    /// scanning for `endstream` (or `endobj`), dropping one EOL before the
    /// keyword. The second value reports whether a recompute happened.
    pub fn stream_data(&self, start: usize, declared: Option<usize>) -> (Bytes, bool) {
        let data = &self.data[..];
        let start = start.min(data.len());
        if let Some(len) = declared
            && let Some(end) = start.checked_add(len)
            && end <= data.len()
            && endstream_follows(data, end)
        {
            return (self.data.slice(start..end), false);
        }

        let end = find(data, b"endstream", start)
            .or_else(|| find(data, b"endobj", start))
            .unwrap_or(data.len());
        let mut trimmed = end;
        if trimmed > start && data[trimmed - 1] == b'\n' {
            trimmed -= 1;
        }
        if trimmed > start && data[trimmed - 1] == b'\r' {
            trimmed -= 1;
        }
        (self.data.slice(start..trimmed), true)
    }
}

fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

/// First occurrence of `needle` at or after `from`.
pub(crate) fn find(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= hay.len() || needle.len() > hay.len() - from {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Last occurrence of `needle`.
pub(crate) fn rfind(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    hay.windows(needle.len()).rposition(|w| w == needle)
}

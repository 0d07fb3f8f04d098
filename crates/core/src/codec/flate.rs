//! Flate (zlib) decoding and encoding.

use crate::error::{PdfError, Result};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{Read, Write};
use tracing::warn;

/// Inflate zlib data. Truncated or damaged streams fall back to a
/// byte-at-a-time inflate that keeps everything decoded before the damage.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    match decoder.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(err) => {
            let partial = decompress_corrupted(data);
            if partial.is_empty() && !data.is_empty() {
                return Err(PdfError::DecodeError(format!("FlateDecode: {}", err)));
            }
            warn!(%err, recovered = partial.len(), "flate stream damaged, using lenient inflate");
            Ok(partial)
        }
    }
}

fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

/// Deflate data with a zlib header at the given level (0-9).
pub fn flate_encode(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

//! LZW stream decoder using the weezl crate.

use crate::error::Result;
use tracing::warn;
use weezl::{BitOrder, decode::Decoder};

/// Decode LZW-encoded data (PDF variant: MSB first, 8-bit, EarlyChange 1).
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data with an explicit `/EarlyChange`.
///
/// EarlyChange=1 (the default) widens codes one code early, as TIFF does;
/// EarlyChange=0 widens them on the boundary, as GIF does.
/// Corrupt input yields whatever was decoded before the damage.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    if let Err(err) = decoder.into_vec(&mut output).decode(data).status {
        warn!(%err, decoded = output.len(), "LZW data damaged, keeping partial output");
    }
    Ok(output)
}

//! ASCII85 and ASCIIHex stream decoders.

use crate::error::{PdfError, Result};

/// Decode ASCII85-encoded data (PDF variant).
/// Handles: z-encoding, <~ ~> markers, whitespace, missing EOD.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut filled = 0;

    for (pos, &byte) in data.iter().enumerate() {
        match byte {
            b' ' | b'\t' | b'\n' | b'\r' | b'\x00' | b'\x0c' => continue,
            b'z' if filled == 0 => {
                result.extend_from_slice(&[0; 4]);
                continue;
            }
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
            }
            _ => {
                return Err(PdfError::DecodeError(format!(
                    "invalid ASCII85 byte {:#04x} at {}",
                    byte, pos
                )));
            }
        }
        if filled == 5 {
            result.extend_from_slice(&group_value(&group).to_be_bytes());
            filled = 0;
        }
    }

    // A final partial group is padded with 'u' and truncated.
    if filled > 1 {
        for slot in group.iter_mut().skip(filled) {
            *slot = b'u' - b'!';
        }
        let bytes = group_value(&group).to_be_bytes();
        result.extend_from_slice(&bytes[..filled - 1]);
    }

    Ok(result)
}

fn group_value(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(d as u32))
}

/// Decode ASCIIHex-encoded data. Stops at `>`; an odd final digit is
/// padded with zero.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for (pos, &byte) in data.iter().enumerate() {
        if byte == b'>' {
            break;
        }
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b' ' | b'\t' | b'\n' | b'\r' | b'\x00' | b'\x0c' => continue,
            _ => {
                return Err(PdfError::DecodeError(format!(
                    "invalid ASCIIHex byte {:#04x} at {}",
                    byte, pos
                )));
            }
        };
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

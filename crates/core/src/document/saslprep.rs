//! SASLprep (RFC 4013) for revision 6 passwords.
//!
//! Applied as a query profile: unassigned code points are let through.

use crate::error::{PdfError, Result};
use unicode_normalization::UnicodeNormalization;

/// Table B.1: mapped to nothing.
fn maps_to_nothing(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{1806}'
            | '\u{180B}'..='\u{180D}'
            | '\u{200B}'..='\u{200D}'
            | '\u{2060}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    )
}

/// Table C.1.2: non-ASCII spaces, mapped to U+0020.
fn is_non_ascii_space(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200B}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// Tables C.2 to C.9.
fn is_prohibited(c: char) -> bool {
    let cp = c as u32;
    // C.4 noncharacters at the end of every plane
    if cp & 0xFFFE == 0xFFFE {
        return true;
    }
    matches!(
        c,
        '\u{0000}'..='\u{001F}'
            | '\u{007F}'..='\u{009F}'
            | '\u{0340}'
            | '\u{0341}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{180E}'
            | '\u{200C}'..='\u{200F}'
            | '\u{2028}'..='\u{202E}'
            | '\u{2060}'..='\u{2063}'
            | '\u{206A}'..='\u{206F}'
            | '\u{2FF0}'..='\u{2FFB}'
            | '\u{E000}'..='\u{F8FF}'
            | '\u{FDD0}'..='\u{FDEF}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFD}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
            | '\u{F0000}'..='\u{FFFFD}'
            | '\u{100000}'..='\u{10FFFD}'
    )
}

/// Table D.1: bidi class R or AL (Hebrew, Arabic, Syriac, Thaana and
/// their presentation forms).
fn is_rand_al(c: char) -> bool {
    matches!(
        c,
        '\u{05BE}'
            | '\u{05C0}'
            | '\u{05C3}'
            | '\u{05D0}'..='\u{05F4}'
            | '\u{061B}'
            | '\u{061F}'
            | '\u{0621}'..='\u{064A}'
            | '\u{066D}'..='\u{06D5}'
            | '\u{06DD}'
            | '\u{06E5}'..='\u{06E6}'
            | '\u{06FA}'..='\u{070D}'
            | '\u{0710}'..='\u{072C}'
            | '\u{0780}'..='\u{07B1}'
            | '\u{200F}'
            | '\u{FB1D}'..='\u{FDFC}'
            | '\u{FE70}'..='\u{FEFC}'
    )
}

/// Table D.2, approximated as alphabetic characters outside D.1.
fn is_l(c: char) -> bool {
    c.is_alphabetic() && !is_rand_al(c)
}

/// Prepare `input`: map, NFKC-normalize, then reject prohibited
/// characters and mixed-direction strings.
pub fn saslprep(input: &str) -> Result<String> {
    let mapped: String = input
        .chars()
        .filter(|&c| !maps_to_nothing(c))
        .map(|c| if is_non_ascii_space(c) { ' ' } else { c })
        .collect();
    let prepared: String = mapped.nfkc().collect();

    if let Some(c) = prepared.chars().find(|&c| is_prohibited(c)) {
        return Err(PdfError::SaslPrepError(format!(
            "prohibited character U+{:04X}",
            c as u32
        )));
    }

    if prepared.chars().any(is_rand_al) {
        let first = prepared.chars().next();
        let last = prepared.chars().next_back();
        if !first.is_some_and(is_rand_al) || !last.is_some_and(is_rand_al) {
            return Err(PdfError::SaslPrepError(
                "right-to-left text must start and end with RandALCat".into(),
            ));
        }
        if prepared.chars().any(is_l) {
            return Err(PdfError::SaslPrepError("mixed bidi directions".into()));
        }
    }
    Ok(prepared)
}

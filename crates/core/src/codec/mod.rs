//! Stream codecs and ciphers.
//!
//! This module contains:
//! - `aes`, `arcfour`: ciphers used by the security handlers
//! - `ascii85`: ASCII85 and ASCIIHex decoding
//! - `flate`: zlib inflate (lenient) and deflate
//! - `lzw`: LZW decompression
//! - `predictor`: PNG and TIFF predictors
//! - `runlength`: run-length decoding
//!
//! [`FilterRegistry`] maps `/Filter` names to decode functions.

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use arcfour::Arcfour;
pub use ascii85::{ascii85decode, asciihexdecode};
pub use flate::{flate_decode, flate_encode};
pub use lzw::{lzwdecode, lzwdecode_with_earlychange};
pub use predictor::{PredictorParams, apply_predictor};
pub use runlength::rldecode;

use crate::error::{PdfError, Result};
use crate::model::{PdfDictionary, PdfName};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A decode function: encoded bytes plus optional DecodeParms in, bytes out.
pub type DecodeFn = Arc<dyn Fn(&[u8], Option<&PdfDictionary>) -> Result<Vec<u8>> + Send + Sync>;

/// Filter names mapped to decoders.
///
/// Unknown names are an `UnsupportedFilter` error rather than being skipped.
#[derive(Clone)]
pub struct FilterRegistry {
    decoders: FxHashMap<PdfName, DecodeFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.decoders.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register_alias(&["FlateDecode", "Fl"], |data, parms| {
            let out = flate_decode(data)?;
            apply_predictor(out, &PredictorParams::from_dict(parms))
        });
        reg.register_alias(&["LZWDecode", "LZW"], |data, parms| {
            let early = parms.and_then(|p| p.get_i64("EarlyChange")).unwrap_or(1);
            let out = lzwdecode_with_earlychange(data, early)?;
            apply_predictor(out, &PredictorParams::from_dict(parms))
        });
        reg.register_alias(&["ASCIIHexDecode", "AHx"], |data, _| asciihexdecode(data));
        reg.register_alias(&["ASCII85Decode", "A85"], |data, _| ascii85decode(data));
        reg.register_alias(&["RunLengthDecode", "RL"], |data, _| rldecode(data));
        // Image codecs live outside this crate; their payload is already final.
        reg.register_alias(&["DCTDecode", "DCT", "JPXDecode"], |data, _| Ok(data.to_vec()));
        // Decryption is done by the security handler before filters run.
        reg.register_alias(&["Crypt"], |data, _| Ok(data.to_vec()));
        reg
    }
}

impl FilterRegistry {
    /// Registry with no filters at all.
    pub fn empty() -> Self {
        Self {
            decoders: FxHashMap::default(),
        }
    }

    /// Add or replace the decoder for `name`.
    pub fn register<F>(&mut self, name: &str, decoder: F)
    where
        F: Fn(&[u8], Option<&PdfDictionary>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.decoders.insert(PdfName::new(name), Arc::new(decoder));
    }

    fn register_alias<F>(&mut self, names: &[&str], decoder: F)
    where
        F: Fn(&[u8], Option<&PdfDictionary>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        let decoder: DecodeFn = Arc::new(decoder);
        for name in names {
            self.decoders.insert(PdfName::new(name), decoder.clone());
        }
    }

    pub fn supports(&self, name: &str) -> bool {
        self.decoders.contains_key(name.as_bytes())
    }

    /// Run `data` through `filters` in order, pairing each with its parms.
    pub fn decode(
        &self,
        data: &[u8],
        filters: &[&str],
        parms: &[Option<&PdfDictionary>],
    ) -> Result<Vec<u8>> {
        let mut output: Option<Vec<u8>> = None;
        for (i, name) in filters.iter().enumerate() {
            let decoder = self
                .decoders
                .get(name.as_bytes())
                .ok_or_else(|| PdfError::UnsupportedFilter((*name).to_string()))?;
            let input = output.as_deref().unwrap_or(data);
            output = Some(decoder(input, parms.get(i).copied().flatten())?);
        }
        Ok(output.unwrap_or_else(|| data.to_vec()))
    }
}

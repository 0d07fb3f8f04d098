//! Predictor post-filter for Flate and LZW (`/Predictor` in DecodeParms).

use crate::error::{PdfError, Result};
use crate::model::PdfDictionary;

/// Predictor settings from a DecodeParms dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(parms: Option<&PdfDictionary>) -> Self {
        let mut p = Self::default();
        if let Some(d) = parms {
            let get = |key: &str, default: i64| d.get_i64(key).unwrap_or(default);
            p.predictor = get("Predictor", 1);
            p.colors = get("Colors", 1).clamp(1, 32) as usize;
            p.bits_per_component = get("BitsPerComponent", 8).clamp(1, 16) as usize;
            p.columns = get("Columns", 1).max(1) as usize;
        }
        p
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8)
    }

    fn row_bytes(&self) -> usize {
        (self.colors * self.bits_per_component * self.columns).div_ceil(8)
    }
}

/// Undo the predictor described by `params`.
pub fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => tiff_predictor(&data, params),
        10..=15 => png_predictor(&data, params),
        other => Err(PdfError::UnsupportedFilter(format!("predictor {}", other))),
    }
}

/// PNG predictors: every row starts with its own filter-type byte.
fn png_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let row_bytes = params.row_bytes();
    let bpp = params.bytes_per_pixel();
    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for chunk in data.chunks(row_bytes + 1) {
        let filter_type = chunk[0];
        let row_data = &chunk[1..];
        // A short last row is decoded as far as it goes.
        let n = row_data.len();

        match filter_type {
            0 => current_row[..n].copy_from_slice(row_data),
            1 => {
                for i in 0..n {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..n {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..n {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let avg = ((left as u16 + prev_row[i] as u16) / 2) as u8;
                    current_row[i] = row_data[i].wrapping_add(avg);
                }
            }
            4 => {
                for i in 0..n {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(paeth_predictor(left, prev_row[i], upper_left));
                }
            }
            other => {
                return Err(PdfError::DecodeError(format!("unknown PNG filter type {}", other)));
            }
        }

        result.extend_from_slice(&current_row[..n]);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

/// TIFF predictor 2: horizontal differencing on 8-bit samples.
fn tiff_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(PdfError::UnsupportedFilter(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_bytes = params.row_bytes();
    let colors = params.colors;
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(out)
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

//! Font metrics seen by the content-stream writer.

use std::fmt;

/// Glyph advances of a font, in thousandths of a text space unit.
///
/// Glyph mapping and embedding live outside this crate; the content
/// writer only needs widths to track the text position.
pub trait FontMetrics: Send + Sync + fmt::Debug {
    /// Advance of every byte code in `text`.
    fn width(&self, text: &[u8]) -> f64;

    /// The `/BaseFont` name.
    fn base_font(&self) -> &str;
}

/// Every glyph has the same advance.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedWidthFont {
    base_font: String,
    advance: f64,
}

impl FixedWidthFont {
    pub fn new(base_font: impl Into<String>, advance: f64) -> Self {
        Self {
            base_font: base_font.into(),
            advance,
        }
    }

    /// Standard 14 Courier (600 units per glyph).
    pub fn courier() -> Self {
        Self::new("Courier", 600.0)
    }
}

impl FontMetrics for FixedWidthFont {
    fn width(&self, text: &[u8]) -> f64 {
        text.len() as f64 * self.advance
    }

    fn base_font(&self) -> &str {
        &self.base_font
    }
}

//! Graphics and text state tracked while writing a content stream.

use super::font::FontMetrics;
use crate::model::PdfName;
use crate::utils::{MATRIX_IDENTITY, Matrix, clamp_unit};
use std::sync::Arc;

/// Device colour, each component in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Gray(f64),
    Rgb(f64, f64, f64),
    Cmyk(f64, f64, f64, f64),
}

impl Default for Color {
    fn default() -> Self {
        Color::Gray(0.0)
    }
}

impl Color {
    /// Same colour with every component clamped into range.
    pub fn clamped(self) -> Self {
        match self {
            Color::Gray(g) => Color::Gray(clamp_unit(g)),
            Color::Rgb(r, g, b) => Color::Rgb(clamp_unit(r), clamp_unit(g), clamp_unit(b)),
            Color::Cmyk(c, m, y, k) => {
                Color::Cmyk(clamp_unit(c), clamp_unit(m), clamp_unit(y), clamp_unit(k))
            }
        }
    }

    pub fn components(&self) -> Vec<f64> {
        match *self {
            Color::Gray(g) => vec![g],
            Color::Rgb(r, g, b) => vec![r, g, b],
            Color::Cmyk(c, m, y, k) => vec![c, m, y, k],
        }
    }
}

/// Font selected with `Tf`: its resource name and metrics.
#[derive(Debug, Clone)]
pub struct FontRef {
    pub resource: PdfName,
    pub metrics: Arc<dyn FontMetrics>,
}

/// State saved by `q` and restored by `Q`.
#[derive(Debug, Clone)]
pub struct GraphicState {
    pub font: Option<FontRef>,
    pub size: f64,
    /// Text line matrix origin.
    pub x_tlm: f64,
    pub y_tlm: f64,
    /// Linear part of the last `Tm`, reused when a text object is resumed.
    pub text_matrix: (f64, f64, f64, f64),
    /// Current x in text space: the line origin plus text shown since.
    pub tx: f64,
    pub leading: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Horizontal scaling in percent.
    pub scale: f64,
    pub rise: f64,
    pub render_mode: i64,
    pub fill_color: Color,
    pub stroke_color: Color,
    pub ctm: Matrix,
    pub line_width: f64,
}

impl Default for GraphicState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            x_tlm: 0.0,
            y_tlm: 0.0,
            text_matrix: (1.0, 0.0, 0.0, 1.0),
            tx: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 100.0,
            rise: 0.0,
            render_mode: 0,
            fill_color: Color::default(),
            stroke_color: Color::default(),
            ctm: MATRIX_IDENTITY,
            line_width: 1.0,
        }
    }
}

impl PartialEq for GraphicState {
    fn eq(&self, other: &Self) -> bool {
        let same_font = match (&self.font, &other.font) {
            (None, None) => true,
            (Some(a), Some(b)) => a.resource == b.resource && Arc::ptr_eq(&a.metrics, &b.metrics),
            _ => false,
        };
        same_font
            && self.size == other.size
            && self.x_tlm == other.x_tlm
            && self.y_tlm == other.y_tlm
            && self.text_matrix == other.text_matrix
            && self.tx == other.tx
            && self.leading == other.leading
            && self.char_spacing == other.char_spacing
            && self.word_spacing == other.word_spacing
            && self.scale == other.scale
            && self.rise == other.rise
            && self.render_mode == other.render_mode
            && self.fill_color == other.fill_color
            && self.stroke_color == other.stroke_color
            && self.ctm == other.ctm
            && self.line_width == other.line_width
    }
}

impl GraphicState {
    /// Reset the text position at the start of a text object.
    pub fn reset_text_position(&mut self) {
        self.x_tlm = 0.0;
        self.y_tlm = 0.0;
        self.tx = 0.0;
        self.text_matrix = (1.0, 0.0, 0.0, 1.0);
    }
}

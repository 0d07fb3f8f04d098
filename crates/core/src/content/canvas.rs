//! Content-stream writer with graphics, text and marked-content tracking.
//!
//! Every operator is appended followed by a newline. Structural mistakes
//! (unbalanced `BT`/`ET`, `q`/`Q`, marked content or layers) are reported
//! as errors instead of producing a broken stream.

use super::font::FontMetrics;
use super::state::{Color, FontRef, GraphicState};
use crate::error::{PdfError, Result};
use crate::model::{PdfName, PdfObject, PdfString};
use crate::utils::{format_number, mult_matrix};
use crate::writer::serialize::{write_name, write_object, write_string};
use std::sync::Arc;

/// One element of a `TJ` array.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPiece<'a> {
    Text(&'a [u8]),
    /// Adjustment in thousandths of text space; positive moves left.
    Kern(f64),
}

/// Builder for a page or form content stream.
#[derive(Debug, Clone)]
pub struct ContentStream {
    buf: Vec<u8>,
    tagged: bool,
    state: GraphicState,
    saved: Vec<GraphicState>,
    in_text: bool,
    /// A tagged text object was closed by a path operator.
    text_suspended: bool,
    marked_depth: usize,
    layers: Vec<PdfName>,
}

impl Default for ContentStream {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ContentStream {
    pub fn new(tagged: bool) -> Self {
        Self {
            buf: Vec::new(),
            tagged,
            state: GraphicState::default(),
            saved: Vec::new(),
            in_text: false,
            text_suspended: false,
            marked_depth: 0,
            layers: Vec::new(),
        }
    }

    /// Empty stream with the same tagging mode and a copy of the current state.
    pub fn duplicate(&self) -> Self {
        Self {
            state: self.state.clone(),
            ..Self::new(self.tagged)
        }
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    pub fn state(&self) -> &GraphicState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn in_text(&self) -> bool {
        self.in_text
    }

    /// Bytes written so far, without any balance check.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finished stream bytes. Fails if any construct is still open.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.sanity_check()?;
        Ok(self.buf.clone())
    }

    /// Append pre-built content verbatim.
    pub fn add_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn num(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(format_number(v).as_bytes());
        self.buf.push(b' ');
        self
    }

    fn op(&mut self, operator: &str) {
        self.buf.extend_from_slice(operator.as_bytes());
        self.buf.push(b'\n');
    }

    fn ops(&mut self, operands: &[f64], operator: &str) {
        for &v in operands {
            self.num(v);
        }
        self.op(operator);
    }

    /// Open a text object. When tagged, an already open one is kept and a
    /// suspended one is resumed at its previous line matrix.
    pub fn begin_text(&mut self) -> Result<()> {
        if self.in_text {
            if self.tagged {
                return Ok(());
            }
            return Err(PdfError::UnbalancedText("BT inside a text object"));
        }
        self.in_text = true;
        self.op("BT");
        if self.tagged && self.text_suspended {
            self.text_suspended = false;
            let (a, b, c, d) = self.state.text_matrix;
            let (x, y, tx) = (self.state.x_tlm, self.state.y_tlm, self.state.tx);
            self.ops(&[a, b, c, d, x, y], "Tm");
            self.state.tx = tx;
        } else {
            self.state.reset_text_position();
        }
        Ok(())
    }

    pub fn end_text(&mut self) -> Result<()> {
        if !self.in_text {
            return Err(PdfError::UnbalancedText("ET outside a text object"));
        }
        self.in_text = false;
        self.op("ET");
        Ok(())
    }

    /// Text operators outside `BT` open one implicitly when tagged.
    fn ensure_text(&mut self) -> Result<()> {
        if !self.in_text && self.tagged {
            self.begin_text()?;
        }
        Ok(())
    }

    /// Path and painting operators cannot appear inside a text object.
    fn leave_text(&mut self, operator: &str) -> Result<()> {
        if self.in_text {
            if !self.tagged {
                return Err(PdfError::IllegalOperation(format!(
                    "operator {} inside a text object",
                    operator
                )));
            }
            self.end_text()?;
            self.text_suspended = true;
        }
        Ok(())
    }

    pub fn save_state(&mut self) -> Result<()> {
        self.leave_text("q")?;
        self.saved.push(self.state.clone());
        self.op("q");
        Ok(())
    }

    pub fn restore_state(&mut self) -> Result<()> {
        if self.saved.is_empty() {
            return Err(PdfError::UnbalancedState);
        }
        self.leave_text("Q")?;
        self.state = self.saved.pop().ok_or(PdfError::UnbalancedState)?;
        self.op("Q");
        Ok(())
    }

    /// `BMC`, or `BDC` when properties are given.
    pub fn begin_marked_content(&mut self, tag: &str, properties: Option<&PdfObject>) {
        write_name(&PdfName::new(tag), &mut self.buf);
        self.buf.push(b' ');
        match properties {
            Some(props) => {
                write_object(props, &mut self.buf);
                self.buf.push(b' ');
                self.op("BDC");
            }
            None => self.op("BMC"),
        }
        self.marked_depth += 1;
    }

    pub fn end_marked_content(&mut self) -> Result<()> {
        if self.marked_depth == 0 {
            return Err(PdfError::UnbalancedMarkedContent);
        }
        self.marked_depth -= 1;
        self.op("EMC");
        Ok(())
    }

    /// Optional content: `/OC /name BDC`.
    pub fn begin_layer(&mut self, resource_name: &str) {
        let name = PdfName::new(resource_name);
        self.buf.extend_from_slice(b"/OC ");
        write_name(&name, &mut self.buf);
        self.buf.push(b' ');
        self.op("BDC");
        self.layers.push(name);
    }

    pub fn end_layer(&mut self) -> Result<()> {
        self.layers.pop().ok_or(PdfError::UnbalancedLayer)?;
        self.op("EMC");
        Ok(())
    }

    /// Verify nothing is left open. A tagged text object is closed instead.
    pub fn sanity_check(&mut self) -> Result<()> {
        if self.marked_depth != 0 {
            return Err(PdfError::DanglingState(format!(
                "{} marked content sequence(s) left open",
                self.marked_depth
            )));
        }
        if self.in_text {
            if !self.tagged {
                return Err(PdfError::DanglingState("text object left open".into()));
            }
            self.end_text()?;
        }
        if !self.layers.is_empty() {
            return Err(PdfError::DanglingState(format!(
                "{} layer(s) left open",
                self.layers.len()
            )));
        }
        if !self.saved.is_empty() {
            return Err(PdfError::DanglingState(format!(
                "{} saved state(s) not restored",
                self.saved.len()
            )));
        }
        Ok(())
    }

    // Text state

    pub fn set_font_and_size(
        &mut self,
        resource: &str,
        metrics: Arc<dyn FontMetrics>,
        size: f64,
    ) -> Result<()> {
        self.ensure_text()?;
        let resource = PdfName::new(resource);
        write_name(&resource, &mut self.buf);
        self.buf.push(b' ');
        self.num(size).op("Tf");
        self.state.font = Some(FontRef { resource, metrics });
        self.state.size = size;
        Ok(())
    }

    pub fn set_leading(&mut self, leading: f64) {
        self.state.leading = leading;
        self.ops(&[leading], "TL");
    }

    pub fn set_character_spacing(&mut self, spacing: f64) {
        self.state.char_spacing = spacing;
        self.ops(&[spacing], "Tc");
    }

    pub fn set_word_spacing(&mut self, spacing: f64) {
        self.state.word_spacing = spacing;
        self.ops(&[spacing], "Tw");
    }

    /// Horizontal scaling in percent.
    pub fn set_horizontal_scaling(&mut self, scale: f64) {
        self.state.scale = scale;
        self.ops(&[scale], "Tz");
    }

    pub fn set_text_rise(&mut self, rise: f64) {
        self.state.rise = rise;
        self.ops(&[rise], "Ts");
    }

    pub fn set_text_render_mode(&mut self, mode: i64) {
        self.state.render_mode = mode;
        self.ops(&[mode as f64], "Tr");
    }

    // Text positioning

    pub fn set_text_matrix(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Result<()> {
        self.ensure_text()?;
        self.state.text_matrix = (a, b, c, d);
        self.state.x_tlm = e;
        self.state.y_tlm = f;
        self.state.tx = e;
        self.ops(&[a, b, c, d, e, f], "Tm");
        Ok(())
    }

    pub fn move_text(&mut self, x: f64, y: f64) -> Result<()> {
        self.ensure_text()?;
        self.state.x_tlm += x;
        self.state.y_tlm += y;
        self.state.tx = self.state.x_tlm;
        self.ops(&[x, y], "Td");
        Ok(())
    }

    /// `TD`: move and set the leading to `-y`.
    pub fn move_text_with_leading(&mut self, x: f64, y: f64) -> Result<()> {
        self.ensure_text()?;
        self.state.leading = -y;
        self.state.x_tlm += x;
        self.state.y_tlm += y;
        self.state.tx = self.state.x_tlm;
        self.ops(&[x, y], "TD");
        Ok(())
    }

    pub fn new_line(&mut self) -> Result<()> {
        self.ensure_text()?;
        self.advance_line();
        self.op("T*");
        Ok(())
    }

    fn advance_line(&mut self) {
        self.state.y_tlm -= self.state.leading;
        self.state.tx = self.state.x_tlm;
    }

    // Text showing

    fn require_font(&self) -> Result<&FontRef> {
        self.state
            .font
            .as_ref()
            .ok_or_else(|| PdfError::IllegalOperation("text shown before Tf".into()))
    }

    pub fn show_text(&mut self, text: &[u8]) -> Result<()> {
        self.ensure_text()?;
        self.require_font()?;
        write_string(&PdfString::new(text), &mut self.buf);
        self.buf.push(b' ');
        self.op("Tj");
        self.state.tx += self.text_width(text);
        Ok(())
    }

    /// `'`: next line, then show.
    pub fn new_line_show_text(&mut self, text: &[u8]) -> Result<()> {
        self.ensure_text()?;
        self.require_font()?;
        self.advance_line();
        write_string(&PdfString::new(text), &mut self.buf);
        self.buf.push(b' ');
        self.op("'");
        self.state.tx += self.text_width(text);
        Ok(())
    }

    /// `TJ` with per-piece kerning.
    pub fn show_text_kerned(&mut self, pieces: &[TextPiece<'_>]) -> Result<()> {
        self.ensure_text()?;
        self.require_font()?;
        let mut advance = 0.0;
        self.buf.push(b'[');
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                self.buf.push(b' ');
            }
            match piece {
                TextPiece::Text(text) => {
                    write_string(&PdfString::new(*text), &mut self.buf);
                    advance += self.text_width(text);
                }
                TextPiece::Kern(k) => {
                    self.buf.extend_from_slice(format_number(*k).as_bytes());
                    advance -= k / 1000.0 * self.state.size * self.state.scale / 100.0;
                }
            }
        }
        self.buf.extend_from_slice(b"] ");
        self.op("TJ");
        self.state.tx += advance;
        Ok(())
    }

    /// Advance of `text` under the current font, spacing and scaling.
    /// Zero when no font is selected.
    pub fn text_width(&self, text: &[u8]) -> f64 {
        let Some(font) = &self.state.font else {
            return 0.0;
        };
        let glyphs = font.metrics.width(text) / 1000.0 * self.state.size;
        let spacing = self.state.char_spacing * text.len() as f64;
        let words = self.state.word_spacing * text.iter().filter(|&&b| b == b' ').count() as f64;
        (glyphs + spacing + words) * self.state.scale / 100.0
    }

    /// Current x in text space.
    pub fn tx(&self) -> f64 {
        self.state.tx
    }

    pub fn x_tlm(&self) -> f64 {
        self.state.x_tlm
    }

    pub fn y_tlm(&self) -> f64 {
        self.state.y_tlm
    }

    // General graphics state

    pub fn concat_ctm(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Result<()> {
        self.leave_text("cm")?;
        self.state.ctm = mult_matrix((a, b, c, d, e, f), self.state.ctm);
        self.ops(&[a, b, c, d, e, f], "cm");
        Ok(())
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.state.line_width = width;
        self.ops(&[width], "w");
    }

    pub fn set_line_cap(&mut self, style: i64) {
        self.ops(&[style as f64], "J");
    }

    pub fn set_line_join(&mut self, style: i64) {
        self.ops(&[style as f64], "j");
    }

    pub fn set_miter_limit(&mut self, limit: f64) {
        self.ops(&[limit], "M");
    }

    pub fn set_line_dash(&mut self, pattern: &[f64], phase: f64) {
        self.buf.push(b'[');
        for (i, &v) in pattern.iter().enumerate() {
            if i > 0 {
                self.buf.push(b' ');
            }
            self.buf.extend_from_slice(format_number(v).as_bytes());
        }
        self.buf.extend_from_slice(b"] ");
        self.ops(&[phase], "d");
    }

    // Colour

    fn set_color(&mut self, color: Color, stroke: bool) {
        let color = color.clamped();
        let operator = match (color, stroke) {
            (Color::Gray(_), false) => "g",
            (Color::Gray(_), true) => "G",
            (Color::Rgb(..), false) => "rg",
            (Color::Rgb(..), true) => "RG",
            (Color::Cmyk(..), false) => "k",
            (Color::Cmyk(..), true) => "K",
        };
        self.ops(&color.components(), operator);
        if stroke {
            self.state.stroke_color = color;
        } else {
            self.state.fill_color = color;
        }
    }

    pub fn set_rgb_color_fill(&mut self, r: f64, g: f64, b: f64) {
        self.set_color(Color::Rgb(r, g, b), false);
    }

    pub fn set_rgb_color_stroke(&mut self, r: f64, g: f64, b: f64) {
        self.set_color(Color::Rgb(r, g, b), true);
    }

    pub fn set_gray_fill(&mut self, gray: f64) {
        self.set_color(Color::Gray(gray), false);
    }

    pub fn set_gray_stroke(&mut self, gray: f64) {
        self.set_color(Color::Gray(gray), true);
    }

    pub fn set_cmyk_color_fill(&mut self, c: f64, m: f64, y: f64, k: f64) {
        self.set_color(Color::Cmyk(c, m, y, k), false);
    }

    pub fn set_cmyk_color_stroke(&mut self, c: f64, m: f64, y: f64, k: f64) {
        self.set_color(Color::Cmyk(c, m, y, k), true);
    }

    // Path construction

    pub fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.leave_text("m")?;
        self.ops(&[x, y], "m");
        Ok(())
    }

    pub fn line_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.leave_text("l")?;
        self.ops(&[x, y], "l");
        Ok(())
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> Result<()> {
        self.leave_text("c")?;
        self.ops(&[x1, y1, x2, y2, x3, y3], "c");
        Ok(())
    }

    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        self.leave_text("re")?;
        self.ops(&[x, y, width, height], "re");
        Ok(())
    }

    pub fn close_path(&mut self) -> Result<()> {
        self.path_op("h")
    }

    // Painting and clipping

    fn path_op(&mut self, operator: &str) -> Result<()> {
        self.leave_text(operator)?;
        self.op(operator);
        Ok(())
    }

    pub fn stroke(&mut self) -> Result<()> {
        self.path_op("S")
    }

    pub fn close_path_stroke(&mut self) -> Result<()> {
        self.path_op("s")
    }

    pub fn fill(&mut self) -> Result<()> {
        self.path_op("f")
    }

    pub fn eo_fill(&mut self) -> Result<()> {
        self.path_op("f*")
    }

    pub fn fill_stroke(&mut self) -> Result<()> {
        self.path_op("B")
    }

    pub fn clip(&mut self) -> Result<()> {
        self.path_op("W")
    }

    pub fn eo_clip(&mut self) -> Result<()> {
        self.path_op("W*")
    }

    pub fn new_path(&mut self) -> Result<()> {
        self.path_op("n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FixedWidthFont;

    #[test]
    fn test_save_restore_restores_state() {
        let mut cs = ContentStream::new(false);
        let before = cs.state().clone();
        cs.save_state().unwrap();
        cs.set_line_width(3.0);
        cs.set_rgb_color_fill(1.0, 0.0, 0.0);
        cs.restore_state().unwrap();
        assert_eq!(cs.state(), &before);
        assert!(matches!(cs.restore_state(), Err(PdfError::UnbalancedState)));
    }

    #[test]
    fn test_text_width_courier() {
        let mut cs = ContentStream::new(false);
        cs.begin_text().unwrap();
        cs.set_font_and_size("F1", Arc::new(FixedWidthFont::courier()), 10.0)
            .unwrap();
        cs.show_text(b"ab").unwrap();
        assert_eq!(cs.tx(), 12.0);
    }
}

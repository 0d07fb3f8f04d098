//! Content-stream construction.
//!
//! - `canvas` - `ContentStream`, the operator writer and its state machine
//! - `state` - graphics and text state saved by `q`/`Q`
//! - `font` - the width metrics the canvas needs for position tracking

pub mod canvas;
pub mod font;
pub mod state;

pub use canvas::{ContentStream, TextPiece};
pub use font::{FixedWidthFont, FontMetrics};
pub use state::{Color, FontRef, GraphicState};

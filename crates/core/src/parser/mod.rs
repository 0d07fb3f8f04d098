//! PDF parsing modules.
//!
//! - `lexer`: byte-level tokenizer
//! - `pdf_parser`: object parser and content-stream operation splitter

pub mod lexer;
pub mod pdf_parser;

// Re-export main types for convenience
pub use lexer::{Keyword, Token, Tokenizer};
pub use pdf_parser::{ContentParser, MAX_NESTING, ObjectParser, Operation};

//! vellum - PDF object reader, cross-reference resolver and content-stream
//! writer.
//!
//! Reading starts from [`PdfReader`], which locates the cross-reference
//! chain (rebuilding it by scan when damaged), decrypts standard and
//! public-key protected files, and materializes objects either eagerly or
//! on demand. Writing goes through [`PdfWriter`] for new documents and
//! [`IncrementalWriter`] for appended revisions; page content is built
//! with [`ContentStream`].

pub mod codec;
pub mod content;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod utils;
pub mod writer;

pub use codec::FilterRegistry;
pub use content::{Color, ContentStream, FixedWidthFont, FontMetrics, GraphicState};
pub use document::{Credentials, PdfPage, PdfReader, ReaderOptions, RecipientDecryptor};
pub use error::{PdfError, Result};
pub use model::{ObjRef, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use writer::{Compression, IncrementalWriter, PdfWriter, WriterOptions};

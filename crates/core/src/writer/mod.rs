//! Output side: object serialization, the body writer with object streams,
//! cross-reference sections, whole documents and incremental updates.

pub mod body;
pub mod incremental;
pub mod pdf_writer;
pub mod serialize;
pub mod xref;

pub use body::{CountingWriter, OBJECT_STREAM_BATCH, PdfBody};
pub use incremental::IncrementalWriter;
pub use pdf_writer::{Compression, PdfWriter, WriterOptions};
pub use serialize::{format_real, to_bytes, write_indirect, write_name, write_object, write_string};
pub use xref::{XrefFormat, write_xref_section};

//! PDF model types.
//!
//! - `objects` - PDF object types (PdfObject, PdfDictionary, PdfStream, ObjRef)
//! - `name` - interned names (PdfName, NameTable)

pub mod name;
pub mod objects;

pub use name::{NameTable, PdfName};
pub use objects::{ObjRef, PdfDictionary, PdfObject, PdfStream, PdfString, StringEncoding};

//! Incremental update: append changed and new objects plus a new
//! cross-reference section after an unchanged original revision.

use super::body::PdfBody;
use super::xref::{XrefFormat, write_xref_section};
use crate::document::{PdfReader, XrefEntry};
use crate::error::{PdfError, Result};
use crate::model::{ObjRef, PdfDictionary, PdfObject};
use std::io::Write;
use tracing::{debug, warn};

/// Appends a revision to an existing document.
#[derive(Debug)]
pub struct IncrementalWriter<'a, W: Write> {
    reader: &'a PdfReader,
    body: PdfBody<W>,
    prev: Option<u64>,
    format: XrefFormat,
}

impl<'a, W: Write> IncrementalWriter<'a, W> {
    /// Copy `original` to `out` and prepare to append to it. `reader` must
    /// have been opened on the same bytes.
    pub fn new(original: &[u8], reader: &'a PdfReader, mut out: W) -> Result<Self> {
        if reader.is_encrypted() {
            return Err(PdfError::UnsupportedEncryption(
                "incremental update of an encrypted document".into(),
            ));
        }
        out.write_all(original)?;
        let mut written = original.len();
        if !original.ends_with(b"\n") && !original.ends_with(b"\r") {
            out.write_all(b"\n")?;
            written += 1;
        }

        // Offsets in the file are counted from the header, not from byte 0.
        let offset = written.saturating_sub(reader.header_offset()) as u64;
        let first_number = reader.object_count().max(1) as u32;
        let mut body = PdfBody::new(out, offset, first_number, false);

        let mut format = if reader.uses_xref_stream() {
            XrefFormat::Stream
        } else {
            XrefFormat::Table
        };
        let prev = if reader.is_rebuilt() {
            // The old chain is unusable, so the new section lists everything.
            warn!("source xref was rebuilt, writing a complete xref section");
            for (num, entry) in reader.xref().iter() {
                if matches!(entry, XrefEntry::InStream { .. }) {
                    format = XrefFormat::Stream;
                }
                body.record(num, entry);
            }
            None
        } else {
            Some(reader.start_xref() as u64)
        };

        Ok(Self {
            reader,
            body,
            prev,
            format,
        })
    }

    /// Generation an existing object is written back under.
    fn generation(&self, num: u32) -> u16 {
        match self.reader.xref_entry(num) {
            Some(XrefEntry::Offset { generation, .. }) => generation,
            _ => 0,
        }
    }

    /// Replace object `num` in the new revision.
    pub fn update(&mut self, num: u32, obj: &PdfObject) -> Result<ObjRef> {
        let r = ObjRef::new(num, self.generation(num));
        self.body.add_at(r, obj)?;
        Ok(r)
    }

    /// Append a new object.
    pub fn add(&mut self, obj: &PdfObject) -> Result<ObjRef> {
        self.body.add(obj)
    }

    pub fn reserve(&mut self) -> ObjRef {
        self.body.reserve()
    }

    pub fn add_at(&mut self, r: ObjRef, obj: &PdfObject) -> Result<()> {
        self.body.add_at(r, obj)
    }

    /// Write the appended xref section and trailer, then return the output.
    pub fn finish(mut self) -> Result<W> {
        let source = self.reader.trailer();
        let mut trailer = PdfDictionary::new();
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = source.get(key) {
                trailer.insert(key, value.clone());
            }
        }
        debug!(size = self.body.size(), prev = ?self.prev, "finishing incremental update");
        write_xref_section(&mut self.body, trailer, self.prev, self.format)?;
        self.body.into_inner()
    }
}

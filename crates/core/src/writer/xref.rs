//! Cross-reference section writer: classic tables and xref streams.

use super::body::PdfBody;
use super::serialize::write_object;
use crate::codec::flate_encode;
use crate::document::XrefEntry;
use crate::error::{PdfError, Result};
use crate::model::{PdfDictionary, PdfObject, PdfStream};
use std::io::Write;
use tracing::debug;

/// How a cross-reference section is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefFormat {
    /// `xref` keyword, 20-byte lines, `trailer` dictionary.
    Table,
    /// `/Type /XRef` stream carrying the trailer keys (PDF 1.5).
    Stream,
}

/// Split sorted entries into runs of consecutive object numbers.
fn subsections(entries: &[(u32, XrefEntry)]) -> Vec<&[(u32, XrefEntry)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0 != entries[i - 1].0 + 1 {
            runs.push(&entries[start..i]);
            start = i;
        }
    }
    runs
}

/// Smallest big-endian width that holds `v`, at least one byte.
fn byte_width(v: u64) -> usize {
    let bits = 64 - v.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn entry_fields(entry: &XrefEntry) -> (u8, u64, u64) {
    match *entry {
        XrefEntry::Free { next, generation } => (0, next as u64, generation as u64),
        XrefEntry::Offset { offset, generation } => (1, offset as u64, generation as u64),
        XrefEntry::InStream { stream, index } => (2, stream as u64, index as u64),
    }
}

/// Flush pending objects, then write the cross-reference section and the
/// trailer for everything `body` wrote. `/Size` and `/Prev` are filled in.
///
/// Returns the `startxref` offset.
pub fn write_xref_section<W: Write>(
    body: &mut PdfBody<W>,
    trailer: PdfDictionary,
    prev: Option<u64>,
    format: XrefFormat,
) -> Result<u64> {
    body.flush_object_stream()?;
    let mut trailer = trailer;
    trailer.remove("XRefStm");
    trailer.remove("Prev");
    match format {
        XrefFormat::Table => write_table(body, trailer, prev),
        XrefFormat::Stream => write_stream(body, trailer, prev),
    }
}

fn write_table<W: Write>(
    body: &mut PdfBody<W>,
    mut trailer: PdfDictionary,
    prev: Option<u64>,
) -> Result<u64> {
    let start = body.position();
    let entries = body.xref_entries();
    let mut buf = Vec::with_capacity(entries.len() * 20 + 128);
    buf.extend_from_slice(b"xref\n");
    for run in subsections(&entries) {
        writeln!(buf, "{} {}", run[0].0, run.len())?;
        for (num, entry) in run {
            match entry {
                XrefEntry::Offset { offset, generation } => write!(buf, "{:010} {:05} n\r\n", offset, generation)?,
                XrefEntry::Free { next, generation } => write!(buf, "{:010} {:05} f\r\n", next, generation)?,
                XrefEntry::InStream { .. } => {
                    return Err(PdfError::IllegalOperation(format!(
                        "object {} is compressed and cannot appear in an xref table",
                        num
                    )));
                }
            }
        }
    }

    trailer.insert("Size", body.size());
    if let Some(prev) = prev {
        trailer.insert("Prev", prev as usize);
    }
    buf.extend_from_slice(b"trailer\n");
    write_object(&PdfObject::Dictionary(trailer), &mut buf);
    write!(buf, "\nstartxref\n{}\n%%EOF\n", start)?;
    body.writer().write_all(&buf)?;
    debug!(startxref = start, entries = entries.len(), "wrote xref table");
    Ok(start)
}

fn write_stream<W: Write>(
    body: &mut PdfBody<W>,
    mut trailer: PdfDictionary,
    prev: Option<u64>,
) -> Result<u64> {
    let xref_ref = body.reserve();
    let start = body.position();
    let mut entries = body.xref_entries();
    entries.push((
        xref_ref.num,
        XrefEntry::Offset {
            offset: start as usize,
            generation: 0,
        },
    ));

    let fields: Vec<(u8, u64, u64)> = entries.iter().map(|(_, e)| entry_fields(e)).collect();
    let w2 = fields.iter().map(|f| byte_width(f.1)).max().unwrap_or(1);
    let w3 = fields.iter().map(|f| byte_width(f.2)).max().unwrap_or(1);

    let mut data = Vec::with_capacity(fields.len() * (1 + w2 + w3));
    for (kind, f2, f3) in &fields {
        data.push(*kind);
        data.extend_from_slice(&f2.to_be_bytes()[8 - w2..]);
        data.extend_from_slice(&f3.to_be_bytes()[8 - w3..]);
    }

    let mut index = Vec::new();
    for run in subsections(&entries) {
        index.push(PdfObject::from(run[0].0));
        index.push(PdfObject::from(run.len()));
    }

    trailer.insert("Type", PdfObject::name("XRef"));
    trailer.insert("Size", body.size());
    trailer.insert("Index", index);
    trailer.insert(
        "W",
        vec![PdfObject::from(1), PdfObject::from(w2), PdfObject::from(w3)],
    );
    trailer.insert("Filter", PdfObject::name("FlateDecode"));
    if let Some(prev) = prev {
        trailer.insert("Prev", prev as usize);
    }
    let encoded = flate_encode(&data, body.flate_level())?;
    body.write_unbatched(xref_ref, &PdfStream::new(trailer, encoded).into())?;
    write!(body.writer(), "startxref\n{}\n%%EOF\n", start)?;
    debug!(startxref = start, entries = entries.len(), w2, w3, "wrote xref stream");
    Ok(start)
}

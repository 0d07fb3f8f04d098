//! Body writer: indirect objects, object-stream batching and offset
//! bookkeeping.

use super::serialize::{write_indirect, write_object};
use crate::codec::flate_encode;
use crate::document::XrefEntry;
use crate::document::xref::MAX_GENERATION;
use crate::error::Result;
use crate::model::{ObjRef, PdfDictionary, PdfObject, PdfStream};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::mem;
use tracing::debug;

/// Objects per `/ObjStm` container before it is flushed.
pub const OBJECT_STREAM_BATCH: usize = 200;

/// Default zlib level for written streams.
pub const DEFAULT_FLATE_LEVEL: u32 = 6;

/// `Write` adapter that tracks how many bytes went through it.
#[derive(Debug)]
pub struct CountingWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    /// `start` is the position of the first byte written through this adapter.
    pub fn new(inner: W, start: u64) -> Self {
        Self {
            inner,
            position: start,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        // On error the whole output is abandoned, so the count may overshoot.
        self.position += buf.len() as u64;
        self.inner.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes numbered objects and remembers where each one landed.
#[derive(Debug)]
pub struct PdfBody<W: Write> {
    out: CountingWriter<W>,
    next_number: u32,
    entries: BTreeMap<u32, XrefEntry>,
    use_object_streams: bool,
    pending: Vec<(u32, Vec<u8>)>,
    flate_level: u32,
}

impl<W: Write> PdfBody<W> {
    /// `offset` is the file position of the next byte written to `out`;
    /// numbering starts at `first_number`.
    pub fn new(out: W, offset: u64, first_number: u32, use_object_streams: bool) -> Self {
        Self {
            out: CountingWriter::new(out, offset),
            next_number: first_number.max(1),
            entries: BTreeMap::new(),
            use_object_streams,
            pending: Vec::new(),
            flate_level: DEFAULT_FLATE_LEVEL,
        }
    }

    pub fn with_flate_level(mut self, level: u32) -> Self {
        self.flate_level = level.min(9);
        self
    }

    pub fn flate_level(&self) -> u32 {
        self.flate_level
    }

    pub fn uses_object_streams(&self) -> bool {
        self.use_object_streams
    }

    /// Current file position.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// One past the highest object number handed out so far.
    pub fn size(&self) -> u32 {
        self.next_number
    }

    /// Allocate a number without writing anything yet.
    pub fn reserve(&mut self) -> ObjRef {
        let r = ObjRef::new(self.next_number, 0);
        self.next_number += 1;
        r
    }

    pub fn add(&mut self, obj: &PdfObject) -> Result<ObjRef> {
        let r = self.reserve();
        self.add_at(r, obj)?;
        Ok(r)
    }

    /// Write `obj` under a reserved (or pre-existing) number.
    pub fn add_at(&mut self, r: ObjRef, obj: &PdfObject) -> Result<()> {
        if r.num >= self.next_number {
            self.next_number = r.num + 1;
        }
        if self.use_object_streams && r.generation == 0 && !matches!(obj, PdfObject::Stream(_)) {
            let mut bytes = Vec::new();
            write_object(obj, &mut bytes);
            self.pending.push((r.num, bytes));
            if self.pending.len() >= OBJECT_STREAM_BATCH {
                self.flush_object_stream()?;
            }
            return Ok(());
        }
        self.write_direct(r, obj)
    }

    fn write_direct(&mut self, r: ObjRef, obj: &PdfObject) -> Result<()> {
        let offset = self.out.position() as usize;
        let mut buf = Vec::new();
        write_indirect(r, obj, &mut buf);
        self.out.write_all(&buf)?;
        self.entries
            .insert(r.num, XrefEntry::Offset { offset, generation: r.generation });
        Ok(())
    }

    /// Write the pending batch as one compressed `/ObjStm`.
    pub fn flush_object_stream(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = mem::take(&mut self.pending);
        let container = self.reserve();

        let mut header = Vec::new();
        let mut objects = Vec::new();
        for (index, (num, bytes)) in batch.iter().enumerate() {
            if index > 0 {
                header.push(b' ');
            }
            write!(header, "{} {}", num, objects.len())?;
            objects.extend_from_slice(bytes);
            objects.push(b'\n');
            self.entries.insert(
                *num,
                XrefEntry::InStream {
                    stream: container.num,
                    index: index as u32,
                },
            );
        }
        header.push(b'\n');
        let first = header.len();
        header.extend_from_slice(&objects);

        let mut dict = PdfDictionary::with_type("ObjStm");
        dict.insert("N", batch.len());
        dict.insert("First", first);
        dict.insert("Filter", PdfObject::name("FlateDecode"));
        let data = flate_encode(&header, self.flate_level)?;
        debug!(
            container = container.num,
            objects = batch.len(),
            "flushed object stream"
        );
        self.write_direct(container, &PdfStream::new(dict, data).into())
    }

    /// Entries written so far, ascending, with the free head at 0.
    pub fn xref_entries(&self) -> Vec<(u32, XrefEntry)> {
        let mut out = Vec::with_capacity(self.entries.len() + 1);
        out.push((
            0,
            XrefEntry::Free {
                next: 0,
                generation: MAX_GENERATION,
            },
        ));
        out.extend(
            self.entries
                .iter()
                .filter(|(num, _)| **num != 0)
                .map(|(num, entry)| (*num, *entry)),
        );
        out
    }

    /// Write `obj` directly, never into an object stream.
    pub(crate) fn write_unbatched(&mut self, r: ObjRef, obj: &PdfObject) -> Result<()> {
        if r.num >= self.next_number {
            self.next_number = r.num + 1;
        }
        self.write_direct(r, obj)
    }

    /// Carry an entry for an object this body did not write.
    pub(crate) fn record(&mut self, num: u32, entry: XrefEntry) {
        if num != 0 && !self.entries.contains_key(&num) {
            self.entries.insert(num, entry);
        }
    }

    pub(crate) fn writer(&mut self) -> &mut CountingWriter<W> {
        &mut self.out
    }

    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }

    /// Flush pending objects and hand back the output.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush_object_stream()?;
        self.out.flush()?;
        Ok(self.out.into_inner())
    }
}

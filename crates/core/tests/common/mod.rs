//! Builders for small synthetic PDF files with correct offsets.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
enum Slot {
    Offset(usize),
    InStream(u32, u32),
}

/// Accumulates objects and remembers where each one starts, relative to
/// the `%PDF-` header.
pub struct PdfBuilder {
    buf: Vec<u8>,
    header_pos: usize,
    slots: BTreeMap<u32, Slot>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        Self::with_junk(b"", version)
    }

    /// Start the file with `junk` before the header.
    pub fn with_junk(junk: &[u8], version: &str) -> Self {
        let mut buf = junk.to_vec();
        let header_pos = buf.len();
        write!(buf, "%PDF-{}\n%\u{e2}\u{e3}\n", version).unwrap();
        Self {
            buf,
            header_pos,
            slots: BTreeMap::new(),
        }
    }

    pub fn pos(&self) -> usize {
        self.buf.len() - self.header_pos
    }

    pub fn offset_of(&self, num: u32) -> usize {
        match self.slots[&num] {
            Slot::Offset(o) => o,
            Slot::InStream(..) => panic!("object {} is compressed", num),
        }
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.slots.insert(num, Slot::Offset(self.pos()));
        write!(self.buf, "{} 0 obj\n{}\nendobj\n", num, body).unwrap();
        self
    }

    /// Stream object with an exact `/Length` unless `length` overrides it.
    pub fn stream(&mut self, num: u32, dict: &str, data: &[u8], length: Option<&str>) -> &mut Self {
        self.slots.insert(num, Slot::Offset(self.pos()));
        let length = length
            .map(str::to_string)
            .unwrap_or_else(|| data.len().to_string());
        write!(self.buf, "{} 0 obj\n<<{} /Length {}>>\nstream\n", num, dict, length).unwrap();
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    /// Uncompressed `/ObjStm` holding `members`.
    pub fn object_stream(&mut self, num: u32, members: &[(u32, &str)]) -> &mut Self {
        let mut header = String::new();
        let mut body = String::new();
        for (i, (member, text)) in members.iter().enumerate() {
            header.push_str(&format!("{} {} ", member, body.len()));
            body.push_str(text);
            body.push(' ');
            self.slots.insert(*member, Slot::InStream(num, i as u32));
        }
        let dict = format!(
            " /Type /ObjStm /N {} /First {}",
            members.len(),
            header.len()
        );
        let data = format!("{}{}", header, body);
        self.stream(num, &dict, data.as_bytes(), None)
    }

    fn size(&self) -> u32 {
        self.slots.keys().next_back().map_or(1, |n| n + 1)
    }

    /// Classic table covering every object so far, numbered from 0.
    /// `trailer_extra` goes inside the trailer dictionary.
    pub fn xref_table(&mut self, trailer_extra: &str) -> usize {
        self.xref_table_with(trailer_extra, |_| true)
    }

    /// Classic table listing only the objects `keep` accepts.
    pub fn xref_table_with(&mut self, trailer_extra: &str, keep: impl Fn(u32) -> bool) -> usize {
        let start = self.pos();
        let size = self.size();
        write!(self.buf, "xref\n0 {}\n0000000000 65535 f\r\n", size).unwrap();
        for num in 1..size {
            match self.slots.get(&num) {
                Some(Slot::Offset(o)) if keep(num) => {
                    write!(self.buf, "{:010} 00000 n\r\n", o).unwrap()
                }
                _ => write!(self.buf, "0000000000 00001 f\r\n").unwrap(),
            }
        }
        write!(
            self.buf,
            "trailer\n<< /Size {}{} >>\nstartxref\n{}\n%%EOF\n",
            size, trailer_extra, start
        )
        .unwrap();
        start
    }

    /// Uncompressed xref stream (W = [1 4 2]) as object `num`.
    pub fn xref_stream(&mut self, num: u32, trailer_extra: &str) -> usize {
        let start = self.pos();
        self.slots.insert(num, Slot::Offset(start));
        let size = self.size();
        let mut data = vec![0u8, 0, 0, 0, 0, 0xFF, 0xFF];
        for n in 1..size {
            let (kind, f2, f3) = match self.slots.get(&n) {
                Some(Slot::Offset(o)) => (1u8, *o as u32, 0u16),
                Some(Slot::InStream(s, i)) => (2, *s, *i as u16),
                None => (0, 0, 1),
            };
            data.push(kind);
            data.extend_from_slice(&f2.to_be_bytes());
            data.extend_from_slice(&f3.to_be_bytes());
        }
        let dict = format!(" /Type /XRef /Size {} /W [1 4 2]{}", size, trailer_extra);
        self.stream(num, &dict, &data, None);
        write!(self.buf, "startxref\n{}\n%%EOF\n", start).unwrap();
        start
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Catalog, page root, one page and its content stream.
pub fn add_basic_document(b: &mut PdfBuilder) {
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>",
        )
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /Contents 4 0 R /Resources << >> >>",
        )
        .stream(4, "", b"BT /F1 12 Tf (Hi) Tj ET", None);
}

/// A well-formed single-page document with a classic xref table.
pub fn simple_pdf() -> Vec<u8> {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    b.xref_table(" /Root 1 0 R");
    b.finish()
}

//! Cross-reference resolution: classic tables, xref streams, `/Prev`
//! chains, hybrid `/XRefStm` files, and rebuild-by-scan.

use super::source::{PdfSource, find};
use crate::codec::FilterRegistry;
use crate::error::{PdfError, Result};
use crate::model::{PdfDictionary, PdfObject};
use crate::parser::{Keyword, ObjectParser, Token, Tokenizer};
use byteorder::{BigEndian, ByteOrder};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Generation number of the reserved free entry 0.
pub const MAX_GENERATION: u16 = 65535;

/// Largest object number accepted from a file. Entries beyond it are dropped.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next: u32, generation: u16 },
    Offset { offset: usize, generation: u16 },
    InStream { stream: u32, index: u32 },
}

impl XrefEntry {
    pub const fn generation(&self) -> u16 {
        match self {
            Self::Free { generation, .. } | Self::Offset { generation, .. } => *generation,
            Self::InStream { .. } => 0,
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }
}

/// Resolved cross-reference map plus the effective trailer.
#[derive(Debug, Clone)]
pub struct XrefTable {
    entries: Vec<Option<XrefEntry>>,
    /// `/Size` as declared, which may exceed the populated slots.
    declared_size: usize,
    trailer: PdfDictionary,
    /// Newest section was an xref stream.
    stream_based: bool,
    rebuilt: bool,
}

impl Default for XrefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XrefTable {
    pub fn new() -> Self {
        Self {
            entries: vec![Some(XrefEntry::Free {
                next: 0,
                generation: MAX_GENERATION,
            })],
            declared_size: 0,
            trailer: PdfDictionary::new(),
            stream_based: false,
            rebuilt: false,
        }
    }

    /// Number of object slots (highest object number + 1).
    pub fn size(&self) -> usize {
        self.entries.len().max(self.declared_size)
    }

    pub fn get(&self, num: u32) -> Option<XrefEntry> {
        self.entries.get(num as usize).copied().flatten()
    }

    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    pub(crate) fn trailer_mut(&mut self) -> &mut PdfDictionary {
        &mut self.trailer
    }

    pub fn is_stream_based(&self) -> bool {
        self.stream_based
    }

    pub fn is_rebuilt(&self) -> bool {
        self.rebuilt
    }

    /// All populated entries in ascending object order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, XrefEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(n, e)| e.map(|e| (n as u32, e)))
    }

    fn grow_to(&mut self, num: u32) -> bool {
        if num > MAX_OBJECT_NUMBER {
            warn!(num, "object number out of range, entry ignored");
            return false;
        }
        let needed = num as usize + 1;
        if self.entries.len() < needed {
            self.entries.resize(needed, None);
        }
        true
    }

    /// Record an entry unless a newer section already did.
    pub(crate) fn set_if_unset(&mut self, num: u32, entry: XrefEntry) {
        if !self.grow_to(num) {
            return;
        }
        let slot = &mut self.entries[num as usize];
        if slot.is_none() {
            *slot = Some(entry);
        }
    }

    pub(crate) fn set(&mut self, num: u32, entry: XrefEntry) {
        if num == 0 || !self.grow_to(num) {
            return;
        }
        self.entries[num as usize] = Some(entry);
    }

    /// Raise the declared size; a short `/Size` never shrinks the table.
    pub(crate) fn ensure_size(&mut self, size: usize) {
        let limit = MAX_OBJECT_NUMBER as usize + 1;
        if size > limit {
            warn!(size, "/Size out of range, clamped");
        }
        self.declared_size = self.declared_size.max(size.min(limit));
    }
}

static OBJ_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)(?:^|[\s\x00])(\d{1,10})[\s\x00]+(\d{1,5})[\s\x00]+obj\b")
        .expect("object header pattern is valid")
});

/// Reads the xref chain of one source.
pub struct XrefResolver<'a> {
    source: &'a PdfSource,
    filters: &'a FilterRegistry,
}

impl<'a> XrefResolver<'a> {
    pub fn new(source: &'a PdfSource, filters: &'a FilterRegistry) -> Self {
        Self { source, filters }
    }

    /// Follow the chain starting at `start`. Newer sections win; a `/Prev`
    /// that revisits an offset is an error.
    pub fn resolve(&self, start: usize) -> Result<XrefTable> {
        let mut table = XrefTable::new();
        let mut visited = FxHashSet::default();
        let mut next = Some(start);
        let mut newest = true;

        while let Some(pos) = next {
            if !visited.insert(pos) {
                return Err(PdfError::XRefLoop(pos));
            }
            let (trailer, is_stream) = self.read_section(pos, &mut table, &mut visited)?;
            debug!(offset = pos, is_stream, "read xref section");

            if let Some(size) = trailer.get_i64("Size") {
                table.ensure_size(size.max(0) as usize);
            }
            next = trailer
                .get("Prev")
                .and_then(|p| p.as_usize().ok());

            if newest {
                table.stream_based = is_stream;
                table.trailer = trailer;
                newest = false;
            } else {
                for (key, value) in trailer.iter() {
                    if !table.trailer.contains_key(key.as_str())
                        && !matches!(key.as_str(), "Prev" | "XRefStm")
                    {
                        table.trailer.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        if !table.trailer.contains_key("Root") {
            return Err(PdfError::MissingRoot);
        }
        Ok(table)
    }

    /// Read one section at `pos` into `table`; returns its trailer.
    fn read_section(
        &self,
        pos: usize,
        table: &mut XrefTable,
        visited: &mut FxHashSet<usize>,
    ) -> Result<(PdfDictionary, bool)> {
        if pos >= self.source.len() {
            return Err(PdfError::NoValidXRef(format!(
                "xref offset {} beyond end of file",
                pos
            )));
        }
        let mut tokens = Tokenizer::new(self.source.data().clone());
        tokens.seek(pos);
        match tokens.next_token()? {
            Token::Keyword(Keyword::Xref) => {
                let trailer = self.read_classic(tokens, table, visited)?;
                Ok((trailer, false))
            }
            Token::Integer(_) => Ok((self.read_stream(pos, table)?, true)),
            other => Err(PdfError::NoValidXRef(format!(
                "expected xref at {}, found {:?}",
                pos, other
            ))),
        }
    }

    fn read_classic(
        &self,
        mut tokens: Tokenizer,
        table: &mut XrefTable,
        visited: &mut FxHashSet<usize>,
    ) -> Result<PdfDictionary> {
        let mut section = Vec::new();

        loop {
            let start = match tokens.next_token()? {
                Token::Keyword(Keyword::Trailer) => break,
                Token::Integer(n) if n >= 0 => n as u32,
                other => {
                    return Err(PdfError::NoValidXRef(format!(
                        "bad xref subsection header {:?}",
                        other
                    )));
                }
            };
            let count = match tokens.next_token()? {
                Token::Integer(n) if n >= 0 => n as u32,
                other => {
                    return Err(PdfError::NoValidXRef(format!(
                        "bad xref subsection count {:?}",
                        other
                    )));
                }
            };

            let mut base = start;
            for i in 0..count {
                let offset = expect_int(&mut tokens)?;
                let generation = expect_int(&mut tokens)?;
                let in_use = match tokens.next_token()? {
                    Token::Keyword(Keyword::Other(flag)) if flag == b"n" => true,
                    Token::Keyword(Keyword::Other(flag)) if flag == b"f" => false,
                    other => {
                        return Err(PdfError::NoValidXRef(format!(
                            "bad xref entry flag {:?}",
                            other
                        )));
                    }
                };

                // Known producer bug: a subsection that starts at 1 but
                // still lists the free head of the list as its first line.
                if i == 0 && base == 1 && !in_use && offset == 0 && generation == MAX_GENERATION as i64 {
                    warn!("xref subsection starts at 1 with entry 0, shifting down");
                    base = 0;
                }

                let num = base.saturating_add(i);
                let generation = generation.clamp(0, MAX_GENERATION as i64) as u16;
                let entry = if in_use {
                    XrefEntry::Offset {
                        offset: offset.max(0) as usize,
                        generation,
                    }
                } else {
                    XrefEntry::Free {
                        next: offset.max(0) as u32,
                        generation,
                    }
                };
                section.push((num, entry));
            }
        }

        let mut parser = ObjectParser::new(tokens);
        let trailer = match parser.read_object()? {
            PdfObject::Dictionary(d) => d,
            other => {
                return Err(PdfError::NoValidXRef(format!(
                    "trailer is a {}",
                    other.type_name()
                )));
            }
        };

        // Hybrid file: the xref stream outranks this section's own lines.
        if let Some(stm) = trailer.get("XRefStm").and_then(|p| p.as_usize().ok())
            && visited.insert(stm)
            && let Err(err) = self.read_stream(stm, table)
        {
            warn!(%err, offset = stm, "ignoring unreadable /XRefStm");
        }

        for (num, entry) in section {
            table.set_if_unset(num, entry);
        }
        Ok(trailer)
    }

    fn read_stream(&self, pos: usize, table: &mut XrefTable) -> Result<PdfDictionary> {
        let mut tokens = Tokenizer::new(self.source.data().clone());
        tokens.seek(pos);
        let mut parser = ObjectParser::new(tokens);
        let (_, obj) = parser.read_indirect_object()?;
        let PdfObject::Stream(stream) = obj else {
            return Err(PdfError::NoValidXRef(format!(
                "object at {} is not an xref stream",
                pos
            )));
        };
        let dict = &stream.dict;
        if dict.type_name() != Some("XRef") {
            return Err(PdfError::NoValidXRef(format!(
                "stream at {} has /Type {:?}",
                pos,
                dict.type_name()
            )));
        }

        let declared = match dict.get("Length") {
            Some(PdfObject::Number(n)) if *n >= 0.0 => Some(*n as usize),
            _ => None,
        };
        let (raw, _) = self
            .source
            .stream_data(stream.offset.unwrap_or(0), declared);
        let data = self
            .filters
            .decode(&raw, &stream.filters(), &stream.decode_parms())?;

        let widths: Vec<usize> = dict
            .get("W")
            .ok_or_else(|| PdfError::NoValidXRef("xref stream missing /W".into()))?
            .as_array()?
            .iter()
            .map(|w| w.as_usize())
            .collect::<Result<_>>()?;
        if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
            return Err(PdfError::NoValidXRef(format!("bad /W {:?}", widths)));
        }
        let (w0, w1, w2) = (widths[0], widths[1], widths[2]);
        let entry_size = w0 + w1 + w2;
        if entry_size == 0 {
            return Err(PdfError::NoValidXRef("xref stream /W is all zero".into()));
        }

        let size = dict.get_i64("Size").unwrap_or(0).max(0) as u32;
        let index: Vec<(u32, u32)> = match dict.get("Index") {
            Some(idx) => idx
                .as_array()?
                .chunks_exact(2)
                .map(|pair| Ok((pair[0].as_u32()?, pair[1].as_u32()?)))
                .collect::<Result<_>>()?,
            None => vec![(0, size)],
        };

        let mut records = data.chunks_exact(entry_size);
        'sections: for (start, count) in index {
            for i in 0..count {
                let Some(rec) = records.next() else {
                    warn!("xref stream shorter than its /Index declares");
                    break 'sections;
                };
                let kind = if w0 == 0 { 1 } else { read_be(&rec[..w0]) };
                let f2 = read_be(&rec[w0..w0 + w1]);
                let f3 = read_be(&rec[w0 + w1..]);
                let num = start.saturating_add(i);
                let entry = match kind {
                    0 => XrefEntry::Free {
                        next: f2 as u32,
                        generation: f3.min(MAX_GENERATION as u64) as u16,
                    },
                    1 => XrefEntry::Offset {
                        offset: f2 as usize,
                        generation: f3.min(MAX_GENERATION as u64) as u16,
                    },
                    2 => XrefEntry::InStream {
                        stream: f2 as u32,
                        index: f3 as u32,
                    },
                    // Unknown types are references to null.
                    _ => continue,
                };
                table.set_if_unset(num, entry);
            }
        }

        let mut trailer = PdfDictionary::new();
        for (key, value) in dict.iter() {
            if !matches!(
                key.as_str(),
                "Length" | "Filter" | "DecodeParms" | "W" | "Index" | "Type"
            ) {
                trailer.insert(key.clone(), value.clone());
            }
        }
        Ok(trailer)
    }

    /// Rebuild by scanning the whole source for `N G obj` headers and
    /// `trailer` dictionaries.
    pub fn rebuild(&self) -> Result<XrefTable> {
        let data = self.source.data();
        let mut table = XrefTable::new();
        table.rebuilt = true;

        for cap in OBJ_HEADER_RE.captures_iter(data) {
            let (Some(num_m), Some(gen_m)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            let Some(num) = parse_ascii::<u32>(num_m.as_bytes()) else {
                continue;
            };
            let Some(generation) = parse_ascii::<u16>(gen_m.as_bytes()) else {
                continue;
            };
            if num == 0 {
                continue;
            }
            let keep = match table.get(num) {
                Some(XrefEntry::Offset { generation: old, .. }) => generation >= old,
                _ => true,
            };
            if keep {
                table.set(
                    num,
                    XrefEntry::Offset {
                        offset: num_m.start(),
                        generation,
                    },
                );
            }
        }

        if table.size() <= 1 {
            return Err(PdfError::NoValidXRef("no objects found by scan".into()));
        }

        let mut trailer = self.scan_trailers();
        if trailer.is_none() {
            trailer = self.synthesize_trailer(&table);
        }
        let mut trailer = trailer.ok_or(PdfError::MissingRoot)?;
        trailer.insert("Size", table.size());
        trailer.remove("Prev");
        trailer.remove("XRefStm");
        table.trailer = trailer;

        warn!(objects = table.size(), "xref rebuilt by scanning the file");
        Ok(table)
    }

    /// Last `trailer` dictionary that names a `/Root`.
    fn scan_trailers(&self) -> Option<PdfDictionary> {
        let data = self.source.data();
        let mut found = None;
        let mut from = 0;
        while let Some(pos) = find(data, b"trailer", from) {
            from = pos + 7;
            let mut tokens = Tokenizer::new(data.clone());
            tokens.seek(from);
            let mut parser = ObjectParser::new(tokens);
            if let Ok(PdfObject::Dictionary(dict)) = parser.read_object()
                && dict.contains_key("Root")
            {
                found = Some(dict);
            }
        }
        found
    }

    /// Trailer built from an xref-stream dictionary or a catalog object.
    fn synthesize_trailer(&self, table: &XrefTable) -> Option<PdfDictionary> {
        let mut offsets: Vec<(usize, u32, u16)> = table
            .iter()
            .filter_map(|(num, e)| match e {
                XrefEntry::Offset { offset, generation } => Some((offset, num, generation)),
                _ => None,
            })
            .collect();
        offsets.sort_unstable();

        let mut from_xref_stream = None;
        let mut catalog = None;
        for (offset, num, generation) in offsets {
            let mut tokens = Tokenizer::new(self.source.data().clone());
            tokens.seek(offset);
            let mut parser = ObjectParser::new(tokens);
            let Ok((_, obj)) = parser.read_indirect_object() else {
                continue;
            };
            let Ok(dict) = obj.as_dict() else {
                continue;
            };
            match dict.type_name() {
                Some("XRef") if dict.contains_key("Root") => {
                    let mut t = PdfDictionary::new();
                    for key in ["Root", "Info", "ID", "Encrypt"] {
                        if let Some(v) = dict.get(key) {
                            t.insert(key, v.clone());
                        }
                    }
                    from_xref_stream = Some(t);
                }
                Some("Catalog") => {
                    catalog = Some(crate::model::ObjRef::new(num, generation));
                }
                _ => {}
            }
        }

        from_xref_stream.or_else(|| {
            catalog.map(|root| {
                let mut t = PdfDictionary::new();
                t.insert("Root", root);
                t
            })
        })
    }
}

fn expect_int(tokens: &mut Tokenizer) -> Result<i64> {
    match tokens.next_token()? {
        Token::Integer(n) => Ok(n),
        other => Err(PdfError::NoValidXRef(format!(
            "expected integer in xref entry, found {:?}",
            other
        ))),
    }
}

/// Big-endian unsigned field; only the low eight bytes of a wider one count.
pub(crate) fn read_be(bytes: &[u8]) -> u64 {
    match bytes.len() {
        0 => 0,
        n @ 1..=8 => BigEndian::read_uint(bytes, n),
        n => BigEndian::read_u64(&bytes[n - 8..]),
    }
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

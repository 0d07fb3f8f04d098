//! PDF reader: opens a source, resolves its xref chain, installs the
//! security handler and materializes objects on demand.

use super::page::PdfPage;
use super::security::{Credentials, RecipientDecryptor, SecurityHandler, create_security_handler};
use super::source::PdfSource;
use super::store::ObjectStore;
use super::xref::{XrefEntry, XrefResolver, XrefTable};
use crate::codec::FilterRegistry;
use crate::error::{PdfError, Result};
use crate::model::{ObjRef, PdfDictionary, PdfObject, PdfStream};
use crate::parser::{ObjectParser, Token, Tokenizer};
use bytes::Bytes;
use memmap2::Mmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a document is opened.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    pub credentials: Credentials,
    /// Parse objects on demand instead of all at open.
    pub partial: bool,
    /// Replaces the default filter set.
    pub filters: Option<FilterRegistry>,
}

impl ReaderOptions {
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.credentials.password = password.into();
        self
    }

    pub fn with_recipient(mut self, decryptor: Arc<dyn RecipientDecryptor>) -> Self {
        self.credentials.recipient = Some(decryptor);
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Decoded contents of an `/ObjStm` container.
#[derive(Debug)]
struct ObjectStreamIndex {
    data: Bytes,
    first: usize,
    members: Vec<(u32, usize)>,
}

/// A parsed PDF document.
///
/// The object cache sits behind a `RefCell`: the reader is `Send` but must
/// not be shared across threads. Use [`PdfReader::duplicate`] for an
/// independent copy.
#[derive(Clone)]
pub struct PdfReader {
    source: PdfSource,
    xref: XrefTable,
    start_xref: usize,
    filters: FilterRegistry,
    credentials: Credentials,
    security: Option<Arc<dyn SecurityHandler>>,
    encrypt_ref: Option<ObjRef>,
    partial: bool,
    store: RefCell<ObjectStore>,
    object_streams: RefCell<FxHashMap<u32, Arc<ObjectStreamIndex>>>,
    loading: RefCell<FxHashSet<u32>>,
    pub(crate) pages: RefCell<Option<Arc<[PdfPage]>>>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("version", &self.source.version())
            .field("objects", &self.xref.size())
            .field("rebuilt", &self.xref.is_rebuilt())
            .field("encrypted", &self.security.is_some())
            .field("partial", &self.partial)
            .finish()
    }
}

impl PdfReader {
    /// Open a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>, options: ReaderOptions) -> Result<Self> {
        let source = PdfSource::new(data.into());
        let filters = options.filters.unwrap_or_default();

        let located = source.find_startxref();
        let start_xref = *located.as_ref().unwrap_or(&0);
        let resolved = located.and_then(|s| XrefResolver::new(&source, &filters).resolve(s));
        let (xref, rebuilt) = match resolved {
            Ok(table) => (table, false),
            Err(err) if err.is_recoverable() => {
                warn!(%err, "xref unusable, rebuilding by scan");
                (XrefResolver::new(&source, &filters).rebuild()?, true)
            }
            Err(err) => return Err(err),
        };

        let mut reader = Self {
            store: RefCell::new(ObjectStore::default()),
            source,
            xref,
            start_xref,
            filters,
            credentials: options.credentials,
            security: None,
            encrypt_ref: None,
            partial: options.partial,
            object_streams: RefCell::new(FxHashMap::default()),
            loading: RefCell::new(FxHashSet::default()),
            pages: RefCell::new(None),
        };
        reader.setup_security()?;
        if rebuilt {
            reader.index_object_streams();
        }

        if reader.catalog().is_err() {
            if rebuilt {
                return Err(PdfError::MissingRoot);
            }
            warn!("trailer /Root does not resolve, rebuilding by scan");
            reader.xref = XrefResolver::new(&reader.source, &reader.filters).rebuild()?;
            reader.reset_cache();
            reader.setup_security()?;
            reader.index_object_streams();
            reader.catalog().map_err(|_| PdfError::MissingRoot)?;
        }

        if !reader.partial {
            reader.read_doc_objects();
        }
        Ok(reader)
    }

    /// Open a file through a read-only memory map.
    pub fn from_path(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the map is read-only and owned by the returned Bytes.
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_bytes(Bytes::from_owner(mmap), options)
    }

    fn reset_cache(&mut self) {
        self.store = RefCell::new(ObjectStore::default());
        self.object_streams.borrow_mut().clear();
        self.security = None;
        self.encrypt_ref = None;
        *self.pages.borrow_mut() = None;
    }

    /// Add members of object streams found by a rebuild scan.
    fn index_object_streams(&mut self) {
        let containers: Vec<u32> = self
            .xref
            .iter()
            .filter(|(_, e)| matches!(e, XrefEntry::Offset { .. }))
            .map(|(num, _)| num)
            .collect();

        let mut found = Vec::new();
        for num in containers {
            let Ok(Some(obj)) = self.get(num) else {
                continue;
            };
            let Ok(stream) = obj.as_stream() else {
                continue;
            };
            if stream.dict.type_name() != Some("ObjStm") {
                continue;
            }
            match self.object_stream(num) {
                Ok(index) => {
                    for (i, (member, _)) in index.members.iter().enumerate() {
                        found.push((*member, num, i as u32));
                    }
                }
                Err(err) => warn!(%err, obj = num, "skipping unreadable object stream"),
            }
        }
        for (member, stream, index) in found {
            self.xref
                .set_if_unset(member, XrefEntry::InStream { stream, index });
        }
    }

    fn setup_security(&mut self) -> Result<()> {
        let Some(entry) = self.xref.trailer().get("Encrypt").cloned() else {
            return Ok(());
        };
        let encrypt_ref = entry.as_reference().ok();
        self.encrypt_ref = encrypt_ref;

        let mut encrypt = match &entry {
            PdfObject::Reference(r) => {
                let obj = self.get(r.num)?.ok_or(PdfError::ObjectNotFound(r.num))?;
                self.store.borrow_mut().pin(r.num);
                obj.as_dict()?.clone()
            }
            other => other.as_dict()?.clone(),
        };
        // Indirect values inside /Encrypt are read before any handler exists.
        let mut nested = Vec::new();
        collect_refs(&PdfObject::Dictionary(encrypt.clone()), &mut nested);
        for r in nested {
            self.get(r.num)?;
            self.store.borrow_mut().pin(r.num);
        }
        for (_, value) in encrypt.iter_mut() {
            if let PdfObject::Reference(r) = value
                && let Some(obj) = self.get(r.num)?
            {
                *value = (*obj).clone();
            }
        }

        let doc_id = self
            .xref
            .trailer()
            .get("ID")
            .and_then(|id| id.as_array().ok())
            .and_then(|ids| ids.first())
            .and_then(|first| first.as_string().ok())
            .map(|s| s.to_vec())
            .unwrap_or_default();

        let handler = create_security_handler(&encrypt, &doc_id, &self.credentials)?;
        self.security = Some(Arc::from(handler));

        // Anything cached so far was read without decryption.
        let mut store = self.store.borrow_mut();
        let keep: Vec<u32> = (0..store.len() as u32)
            .filter(|&n| store.is_pinned(n))
            .collect();
        let mut fresh = ObjectStore::default();
        for num in keep {
            if let Some(obj) = store.get(num) {
                fresh.insert(num, obj);
                fresh.pin(num);
            }
        }
        *store = fresh;
        self.object_streams.borrow_mut().clear();
        Ok(())
    }

    /// Parse every object eagerly; failures are logged and retried lazily.
    fn read_doc_objects(&self) {
        let mut in_streams = Vec::new();
        for (num, entry) in self.xref.iter() {
            match entry {
                XrefEntry::Offset { .. } => {
                    if let Err(err) = self.get(num) {
                        warn!(%err, obj = num, "skipping unparseable object");
                    }
                }
                XrefEntry::InStream { .. } => in_streams.push(num),
                XrefEntry::Free { .. } => {}
            }
        }
        for num in in_streams {
            if let Err(err) = self.get(num) {
                warn!(%err, obj = num, "skipping object in damaged object stream");
            }
        }
        debug!(loaded = self.store.borrow().loaded(), "read document objects");
    }

    /// Object `num`, parsed on first access. `None` for free or unknown numbers.
    pub fn get(&self, num: u32) -> Result<Option<Arc<PdfObject>>> {
        if let Some(obj) = self.store.borrow().get(num) {
            return Ok(Some(obj));
        }
        if !self.loading.borrow_mut().insert(num) {
            return Err(PdfError::SyntaxError(format!(
                "object {} refers to itself while loading",
                num
            )));
        }
        let loaded = self.load(num);
        self.loading.borrow_mut().remove(&num);

        let Some(obj) = loaded? else {
            return Ok(None);
        };
        let obj = Arc::new(obj);
        let mut store = self.store.borrow_mut();
        if self.partial {
            store.insert_partial(num, obj.clone());
        } else {
            store.insert(num, obj.clone());
        }
        Ok(Some(obj))
    }

    /// Evict a lazily loaded object; a later `get` parses it again.
    pub fn release(&self, num: u32) -> bool {
        self.partial && self.store.borrow_mut().release(num)
    }

    /// Evict the most recently lazily loaded object.
    pub fn release_last(&self) -> bool {
        self.partial && self.store.borrow_mut().release_last()
    }

    fn load(&self, num: u32) -> Result<Option<PdfObject>> {
        match self.xref.get(num) {
            None | Some(XrefEntry::Free { .. }) => Ok(None),
            Some(XrefEntry::Offset { offset, .. }) => self.load_at(num, offset).map(Some),
            Some(XrefEntry::InStream { stream, index }) => {
                self.load_from_stream(num, stream, index).map(Some)
            }
        }
    }

    fn load_at(&self, num: u32, offset: usize) -> Result<PdfObject> {
        let mut tokens = Tokenizer::new(self.source.data().clone());
        tokens.seek(offset);
        let mut parser = ObjectParser::new(tokens);
        let (id, mut obj) = parser.read_indirect_object()?;
        if id.num != num {
            return Err(PdfError::SyntaxError(format!(
                "xref points object {} at {} but found {}",
                num, offset, id
            )));
        }

        if let PdfObject::Stream(stream) = &mut obj {
            self.materialize_stream(id, stream)?;
        }

        if let Some(security) = &self.security
            && self.encrypt_ref.map(|r| r.num) != Some(num)
            && obj.as_dict().ok().and_then(|d| d.type_name()) != Some("XRef")
        {
            decrypt_strings(&mut obj, id, security.as_ref())?;
        }
        Ok(obj)
    }

    fn materialize_stream(&self, id: ObjRef, stream: &mut PdfStream) -> Result<()> {
        let declared = match stream.dict.get("Length") {
            Some(PdfObject::Number(n)) if *n >= 0.0 => Some(*n as usize),
            Some(PdfObject::Reference(r)) => self
                .get(r.num)
                .ok()
                .flatten()
                .and_then(|len| len.as_usize().ok()),
            _ => None,
        };
        let start = stream.offset.unwrap_or(0);
        let (raw, recomputed) = self.source.stream_data(start, declared);
        if recomputed {
            warn!(obj = id.num, declared = ?declared, actual = raw.len(), "stream /Length recomputed");
            stream.dict.insert("Length", raw.len());
        }
        stream.set_raw(raw);

        if let Some(security) = &self.security
            && Some(id.num) != self.encrypt_ref.map(|r| r.num)
            && stream.dict.type_name() != Some("XRef")
            && security.encrypts_stream(&stream.dict)
        {
            stream.crypt_ref = Some(id);
        }
        Ok(())
    }

    fn object_stream(&self, num: u32) -> Result<Arc<ObjectStreamIndex>> {
        if let Some(index) = self.object_streams.borrow().get(&num) {
            return Ok(index.clone());
        }
        let container = self.get(num)?.ok_or(PdfError::ObjectNotFound(num))?;
        let stream = container.as_stream()?;
        let count = stream.dict.get_i64("N").unwrap_or(0).max(0) as usize;
        let first = stream.dict.get_i64("First").unwrap_or(0).max(0) as usize;
        let data = Bytes::from(self.decode_stream(stream)?);

        let mut tokens = Tokenizer::new(data.clone());
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            match (tokens.next_token()?, tokens.next_token()?) {
                (Token::Integer(obj), Token::Integer(off)) if obj >= 0 && off >= 0 => {
                    members.push((obj as u32, off as usize));
                }
                _ => break,
            }
        }
        let index = Arc::new(ObjectStreamIndex {
            data,
            first,
            members,
        });
        if !self.partial {
            self.object_streams.borrow_mut().insert(num, index.clone());
        }
        Ok(index)
    }

    fn load_from_stream(&self, num: u32, stream: u32, index: u32) -> Result<PdfObject> {
        let objstm = self.object_stream(stream)?;
        let offset = match objstm.members.get(index as usize) {
            Some(&(member, off)) if member == num => off,
            _ => objstm
                .members
                .iter()
                .find(|(member, _)| *member == num)
                .map(|&(_, off)| off)
                .ok_or(PdfError::ObjectNotFound(num))?,
        };
        let mut tokens = Tokenizer::new(objstm.data.clone());
        tokens.seek(objstm.first + offset);
        ObjectParser::new(tokens).read_object()
    }

    /// Follow references until a direct value; dangling references are null.
    pub fn resolve(&self, obj: &PdfObject) -> Result<Arc<PdfObject>> {
        let mut seen = FxHashSet::default();
        let mut current = match obj {
            PdfObject::Reference(r) => *r,
            direct => return Ok(Arc::new(direct.clone())),
        };
        loop {
            if !seen.insert(current.num) {
                return Err(PdfError::SyntaxError(format!(
                    "reference cycle through {}",
                    current
                )));
            }
            match self.get(current.num)? {
                None => return Ok(Arc::new(PdfObject::Null)),
                Some(found) => match found.as_ref() {
                    PdfObject::Reference(next) => current = *next,
                    _ => return Ok(found),
                },
            }
        }
    }

    /// Stream payload after decryption, before filters.
    pub fn raw_stream_bytes(&self, stream: &PdfStream) -> Result<Bytes> {
        match (&self.security, stream.crypt_ref) {
            (Some(security), Some(id)) => Ok(Bytes::from(security.decrypt_stream(
                id,
                stream.raw(),
                &stream.dict,
            )?)),
            _ => Ok(stream.raw().clone()),
        }
    }

    /// Stream payload after decryption and all filters.
    pub fn decode_stream(&self, stream: &PdfStream) -> Result<Vec<u8>> {
        let raw = self.raw_stream_bytes(stream)?;
        self.filters
            .decode(&raw, &stream.filters(), &stream.decode_parms())
    }

    /// Mark everything reachable from the trailer; drop the rest.
    ///
    /// Returns how many objects were removed.
    pub fn remove_unused_objects(&mut self) -> Result<usize> {
        let mut reached = FxHashSet::default();
        let mut stack = Vec::new();
        collect_refs(
            &PdfObject::Dictionary(self.xref.trailer().clone()),
            &mut stack,
        );

        while let Some(r) = stack.pop() {
            if !reached.insert(r.num) {
                continue;
            }
            if let Some(XrefEntry::InStream { stream, .. }) = self.xref.get(r.num) {
                reached.insert(stream);
            }
            if let Some(obj) = self.get(r.num)? {
                collect_refs(&obj, &mut stack);
            }
        }
        if let Some(r) = self.encrypt_ref {
            reached.insert(r.num);
        }

        let mut removed = 0;
        let unreached: Vec<(u32, XrefEntry)> = self
            .xref
            .iter()
            .filter(|(num, e)| *num != 0 && !e.is_free() && !reached.contains(num))
            .collect();
        let mut store = self.store.borrow_mut();
        for (num, entry) in unreached {
            store.remove(num);
            self.xref.set(
                num,
                XrefEntry::Free {
                    next: 0,
                    generation: entry.generation(),
                },
            );
            removed += 1;
        }
        drop(store);
        *self.pages.borrow_mut() = None;
        debug!(removed, "removed unreachable objects");
        Ok(removed)
    }

    /// Independent copy sharing nothing mutable with `self`.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Number of object slots (highest object number + 1).
    pub fn object_count(&self) -> usize {
        self.xref.size()
    }

    pub fn xref_entry(&self, num: u32) -> Option<XrefEntry> {
        self.xref.get(num)
    }

    pub(crate) fn xref(&self) -> &XrefTable {
        &self.xref
    }

    pub fn trailer(&self) -> &PdfDictionary {
        self.xref.trailer()
    }

    /// The `/Root` catalog dictionary.
    pub fn catalog(&self) -> Result<Arc<PdfObject>> {
        let root = self.xref.trailer().get("Root").ok_or(PdfError::MissingRoot)?;
        let catalog = self.resolve(root)?;
        match catalog.as_ref() {
            PdfObject::Dictionary(_) => Ok(catalog),
            _ => Err(PdfError::MissingRoot),
        }
    }

    /// Header version, raised by a catalog `/Version` entry.
    pub fn version(&self) -> String {
        let header = self.source.version().to_string();
        let catalog_version = self
            .catalog()
            .ok()
            .and_then(|c| c.as_dict().ok().and_then(|d| d.get_name("Version").map(str::to_string)));
        match catalog_version {
            Some(v) if version_number(&v) > version_number(&header) => v,
            _ => header,
        }
    }

    pub fn is_rebuilt(&self) -> bool {
        self.xref.is_rebuilt()
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Offset named by the last `startxref`, relative to the header.
    pub fn start_xref(&self) -> usize {
        self.start_xref
    }

    /// Whether the newest xref section is a stream.
    pub fn uses_xref_stream(&self) -> bool {
        self.xref.is_stream_based()
    }

    /// Junk bytes before `%PDF-`.
    pub fn header_offset(&self) -> usize {
        self.source.header_offset()
    }

    pub fn source_bytes(&self) -> &Bytes {
        self.source.data()
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }
}

fn version_number(v: &str) -> f64 {
    v.parse().unwrap_or(0.0)
}

/// Push every reference inside `obj`, in document order.
pub(crate) fn collect_refs(obj: &PdfObject, out: &mut Vec<ObjRef>) {
    let mut stack = vec![obj];
    while let Some(o) = stack.pop() {
        match o {
            PdfObject::Reference(r) => out.push(*r),
            PdfObject::Array(arr) => stack.extend(arr.iter().rev()),
            PdfObject::Dictionary(d) => stack.extend(d.values()),
            PdfObject::Stream(s) => stack.extend(s.dict.values()),
            _ => {}
        }
    }
}

fn decrypt_strings(obj: &mut PdfObject, id: ObjRef, security: &dyn SecurityHandler) -> Result<()> {
    match obj {
        PdfObject::String(s) => s.bytes = security.decrypt_string(id, &s.bytes)?,
        PdfObject::Array(arr) => {
            for item in arr {
                decrypt_strings(item, id, security)?;
            }
        }
        PdfObject::Dictionary(d) => {
            for (_, value) in d.iter_mut() {
                decrypt_strings(value, id, security)?;
            }
        }
        PdfObject::Stream(s) => {
            for (_, value) in s.dict.iter_mut() {
                decrypt_strings(value, id, security)?;
            }
        }
        _ => {}
    }
    Ok(())
}

//! PDF name values and the per-parser interning table.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A PDF name (`/Type`), stored without the leading slash and with
/// `#xx` escapes already decoded.
///
/// Equality, hashing and ordering are over the decoded bytes, so names that
/// are not UTF-8 stay distinct and are written back unchanged.
#[derive(Clone, Default)]
pub struct PdfName(Repr);

#[derive(Clone)]
enum Repr {
    Text(SmolStr),
    /// Bytes that are not UTF-8, with a byte-per-char rendition for display.
    Raw { bytes: Arc<[u8]>, latin1: SmolStr },
}

impl Default for Repr {
    fn default() -> Self {
        Repr::Text(SmolStr::default())
    }
}

impl PdfName {
    pub fn new(name: &str) -> Self {
        Self(Repr::Text(SmolStr::new(name)))
    }

    /// Build a name from raw decoded bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => Self::new(s),
            Err(_) => Self(Repr::Raw {
                bytes: Arc::from(bytes),
                latin1: bytes.iter().map(|&b| char::from(b)).collect::<String>().into(),
            }),
        }
    }

    /// Text form. Names that are not UTF-8 read byte-per-char (Latin-1).
    pub fn as_str(&self) -> &str {
        match &self.0 {
            Repr::Text(s) => s.as_str(),
            Repr::Raw { latin1, .. } => latin1.as_str(),
        }
    }

    /// Bytes as they appear between the slash and the next delimiter,
    /// before `#xx` escaping.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Repr::Text(s) => s.as_bytes(),
            Repr::Raw { bytes, .. } => &bytes[..],
        }
    }

    pub fn is_utf8(&self) -> bool {
        matches!(self.0, Repr::Text(_))
    }
}

impl PartialEq for PdfName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PdfName {}

impl Hash for PdfName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for PdfName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PdfName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Borrow<[u8]> for PdfName {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq<str> for PdfName {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for PdfName {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl From<&str> for PdfName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PdfName {
    fn from(s: String) -> Self {
        Self(Repr::Text(SmolStr::from(s)))
    }
}

impl fmt::Debug for PdfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl fmt::Display for PdfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

/// Interning table owned by one parser (or shared explicitly between the
/// parsers of one document). Equal names resolve to the same stored value.
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: FxHashMap<Box<[u8]>, PdfName>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, bytes: &[u8]) -> PdfName {
        if let Some(name) = self.names.get(bytes) {
            return name.clone();
        }
        let name = PdfName::from_bytes(bytes);
        self.names.insert(bytes.into(), name.clone());
        name
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

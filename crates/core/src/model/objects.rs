//! PDF object types.

use super::name::PdfName;
use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use std::fmt;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PdfObject {
    /// Null object
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer or real value
    Number(f64),
    /// String (byte array)
    String(PdfString),
    /// Name object (e.g., /Type, /Font)
    Name(PdfName),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dictionary(PdfDictionary),
    /// Stream (dictionary + binary data)
    Stream(Box<PdfStream>),
    /// Indirect object reference
    Reference(ObjRef),
}

impl PdfObject {
    pub fn name(name: &str) -> Self {
        Self::Name(PdfName::new(name))
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PdfString::new(bytes))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value
    pub const fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer; reals are truncated toward zero.
    pub const fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Number(n) => Ok(*n as i64),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get as a non-negative integer that fits an object number or offset.
    pub fn as_u32(&self) -> Result<u32> {
        let n = self.as_i64()?;
        u32::try_from(n).map_err(|_| PdfError::TypeError {
            expected: "unsigned int",
            got: "negative or oversized number",
        })
    }

    pub fn as_usize(&self) -> Result<usize> {
        let n = self.as_i64()?;
        usize::try_from(n).map_err(|_| PdfError::TypeError {
            expected: "unsigned int",
            got: "negative number",
        })
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(n) => Ok(n.as_str()),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get the string's bytes
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(&s.bytes),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary. A stream yields its dictionary.
    pub fn as_dict(&self) -> Result<&PdfDictionary> {
        match self {
            Self::Dictionary(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut PdfDictionary> {
        let got = self.type_name();
        match self {
            Self::Dictionary(d) => Ok(d),
            Self::Stream(s) => Ok(&mut s.dict),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got,
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_reference(&self) -> Result<ObjRef> {
        match self {
            Self::Reference(r) => Ok(*r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Read a four-number rectangle array, normalized so that
    /// `[llx lly urx ury]` has the lower-left corner first.
    pub fn as_rect(&self) -> Result<[f64; 4]> {
        let arr = self.as_array()?;
        if arr.len() != 4 {
            return Err(PdfError::TypeError {
                expected: "4-element array",
                got: "array of other length",
            });
        }
        let mut r = [0.0; 4];
        for (slot, v) in r.iter_mut().zip(arr) {
            *slot = v.as_f64()?;
        }
        Ok([r[0].min(r[2]), r[1].min(r[3]), r[0].max(r[2]), r[1].max(r[3])])
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Name(_) => "name",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Reference(_) => "ref",
        }
    }
}

impl From<bool> for PdfObject {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for PdfObject {
    fn from(v: i32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i64> for PdfObject {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<u32> for PdfObject {
    fn from(v: u32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<usize> for PdfObject {
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<f64> for PdfObject {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<PdfName> for PdfObject {
    fn from(v: PdfName) -> Self {
        Self::Name(v)
    }
}

impl From<PdfString> for PdfObject {
    fn from(v: PdfString) -> Self {
        Self::String(v)
    }
}

impl From<Vec<PdfObject>> for PdfObject {
    fn from(v: Vec<PdfObject>) -> Self {
        Self::Array(v)
    }
}

impl From<PdfDictionary> for PdfObject {
    fn from(v: PdfDictionary) -> Self {
        Self::Dictionary(v)
    }
}

impl From<PdfStream> for PdfObject {
    fn from(v: PdfStream) -> Self {
        Self::Stream(Box::new(v))
    }
}

impl From<ObjRef> for PdfObject {
    fn from(v: ObjRef) -> Self {
        Self::Reference(v)
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    /// Object number
    pub num: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjRef {
    pub const fn new(num: u32, generation: u16) -> Self {
        Self { num, generation }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

/// How the bytes of a string were produced from text, if they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    /// Opaque bytes (as read from a file, or binary data).
    #[default]
    Bytes,
    /// Text encoded as PDFDocEncoding.
    PdfDoc,
    /// Text encoded as UTF-16BE with a byte order mark.
    Utf16Be,
}

/// PDF string: bytes plus the form it was (or will be) written in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    /// Written as `<...>` rather than `(...)`.
    pub hex: bool,
    pub encoding: StringEncoding,
}

impl PdfString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
            encoding: StringEncoding::Bytes,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
            encoding: StringEncoding::Bytes,
        }
    }

    /// Encode a text string, preferring single-byte PDFDocEncoding.
    pub fn from_text(text: &str) -> Self {
        if text.chars().all(|c| (c as u32) < 0x100) {
            Self {
                bytes: text.chars().map(|c| c as u8).collect(),
                hex: false,
                encoding: StringEncoding::PdfDoc,
            }
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Self {
                bytes,
                hex: false,
                encoding: StringEncoding::Utf16Be,
            }
        }
    }

    /// Decode as a PDF text string (UTF-16BE or UTF-8 with BOM, else
    /// PDFDocEncoding approximated as Latin-1).
    pub fn to_text(&self) -> String {
        let b = &self.bytes;
        if b.len() >= 2 && b[0] == 0xFE && b[1] == 0xFF {
            let units: Vec<u16> = b[2..]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else if b.starts_with(&[0xEF, 0xBB, 0xBF]) {
            String::from_utf8_lossy(&b[3..]).into_owned()
        } else {
            b.iter().map(|&c| char::from(c)).collect()
        }
    }
}

/// PDF dictionary. Keeps insertion order for stable output; equality
/// ignores order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary {
    entries: IndexMap<PdfName, PdfObject>,
}

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary with a `/Type` entry.
    pub fn with_type(type_name: &str) -> Self {
        let mut d = Self::new();
        d.insert("Type", PdfObject::name(type_name));
        d
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.entries.get(key.as_bytes())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfObject> {
        self.entries.get_mut(key.as_bytes())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key.as_bytes())
    }

    pub fn insert(&mut self, key: impl Into<PdfName>, value: impl Into<PdfObject>) -> Option<PdfObject> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.entries.shift_remove(key.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PdfName, &mut PdfObject)> {
        self.entries.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PdfName> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &PdfObject> {
        self.entries.values()
    }

    /// Name value for `key`, if present and a name.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_name().ok())
    }

    /// Integer value for `key`, if present and a number.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64().ok())
    }

    /// `/Type` value.
    pub fn type_name(&self) -> Option<&str> {
        self.get_name("Type")
    }
}

impl FromIterator<(PdfName, PdfObject)> for PdfDictionary {
    fn from_iter<I: IntoIterator<Item = (PdfName, PdfObject)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// PDF stream - dictionary attributes plus the raw (still encoded) payload.
#[derive(Debug, Clone, Default)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    /// Encoded bytes exactly as stored in the file (possibly encrypted).
    raw: Bytes,
    /// Offset of the first data byte in the source, if read from a file.
    pub offset: Option<usize>,
    /// Identity used for decryption; `None` for streams that are not encrypted.
    pub(crate) crypt_ref: Option<ObjRef>,
}

impl PdfStream {
    /// Stream with already-encoded data; `/Length` is set at write time.
    pub fn new(dict: PdfDictionary, raw: impl Into<Bytes>) -> Self {
        Self {
            dict,
            raw: raw.into(),
            offset: None,
            crypt_ref: None,
        }
    }

    /// Stream whose byte range in the source is known but not yet read.
    pub(crate) fn pending(dict: PdfDictionary, offset: usize) -> Self {
        Self {
            dict,
            raw: Bytes::new(),
            offset: Some(offset),
            crypt_ref: None,
        }
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub(crate) fn set_raw(&mut self, raw: Bytes) {
        self.raw = raw;
    }

    /// Replace the payload with new encoded bytes.
    pub fn set_data(&mut self, raw: impl Into<Bytes>) {
        self.raw = raw.into();
        self.crypt_ref = None;
    }

    /// True when the payload still needs decryption before decoding.
    pub fn is_encrypted(&self) -> bool {
        self.crypt_ref.is_some()
    }

    /// Filter names in application order.
    pub fn filters(&self) -> Vec<&str> {
        match self.dict.get("Filter") {
            Some(PdfObject::Name(n)) => vec![n.as_str()],
            Some(PdfObject::Array(arr)) => arr.iter().filter_map(|v| v.as_name().ok()).collect(),
            _ => Vec::new(),
        }
    }

    /// Decode parameters matching each filter position.
    pub fn decode_parms(&self) -> Vec<Option<&PdfDictionary>> {
        let count = self.filters().len();
        let parms = self.dict.get("DecodeParms").or_else(|| self.dict.get("DP"));
        match parms {
            Some(PdfObject::Dictionary(d)) => {
                let mut v = vec![None; count.max(1)];
                v[0] = Some(d);
                v
            }
            Some(PdfObject::Array(arr)) => {
                let mut v: Vec<Option<&PdfDictionary>> = arr
                    .iter()
                    .map(|p| match p {
                        PdfObject::Dictionary(d) => Some(d),
                        _ => None,
                    })
                    .collect();
                v.resize(count, None);
                v
            }
            _ => vec![None; count],
        }
    }
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.raw == other.raw
    }
}

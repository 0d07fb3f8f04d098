//! PDF object serialization.

use crate::model::{ObjRef, PdfName, PdfObject, PdfStream, PdfString};
use std::io::Write;

/// Bytes that must be `#xx`-escaped inside a name.
fn name_needs_escape(b: u8) -> bool {
    !(b'!'..=b'~').contains(&b)
        || matches!(
            b,
            b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
        )
}

/// Shortest decimal that parses back to `v`, never in exponent form.
pub fn format_real(v: f64) -> String {
    if !v.is_finite() || v == 0.0 {
        return "0".to_string();
    }
    // Display for f64 is shortest round-trip and never uses an exponent.
    format!("{}", v)
}

pub fn write_name(name: &PdfName, out: &mut Vec<u8>) {
    out.push(b'/');
    for &b in name.as_bytes() {
        if name_needs_escape(b) {
            let _ = write!(out, "#{:02X}", b);
        } else {
            out.push(b);
        }
    }
}

pub fn write_string(s: &PdfString, out: &mut Vec<u8>) {
    if s.hex {
        out.push(b'<');
        for b in &s.bytes {
            let _ = write!(out, "{:02X}", b);
        }
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &b in &s.bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn write_reference(r: ObjRef, out: &mut Vec<u8>) {
    let _ = write!(out, "{} {} R", r.num, r.generation);
}

/// Append `obj` in PDF syntax. Streams carry their data and a `/Length`
/// equal to the payload, so they belong only in indirect objects.
pub fn write_object(obj: &PdfObject, out: &mut Vec<u8>) {
    match obj {
        PdfObject::Null => out.extend_from_slice(b"null"),
        PdfObject::Boolean(true) => out.extend_from_slice(b"true"),
        PdfObject::Boolean(false) => out.extend_from_slice(b"false"),
        PdfObject::Number(n) => out.extend_from_slice(format_real(*n).as_bytes()),
        PdfObject::String(s) => write_string(s, out),
        PdfObject::Name(n) => write_name(n, out),
        PdfObject::Reference(r) => write_reference(*r, out),
        PdfObject::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out);
            }
            out.push(b']');
        }
        PdfObject::Dictionary(dict) => {
            out.extend_from_slice(b"<<");
            for (i, (key, value)) in dict.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_name(key, out);
                out.push(b' ');
                write_object(value, out);
            }
            out.extend_from_slice(b">>");
        }
        PdfObject::Stream(stream) => write_stream(stream, out),
    }
}

fn write_stream(stream: &PdfStream, out: &mut Vec<u8>) {
    let mut dict = stream.dict.clone();
    dict.insert("Length", stream.len());
    write_object(&PdfObject::Dictionary(dict), out);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(stream.raw());
    out.extend_from_slice(b"\nendstream");
}

/// `N G obj ... endobj` framing.
pub fn write_indirect(r: ObjRef, obj: &PdfObject, out: &mut Vec<u8>) {
    let _ = writeln!(out, "{} {} obj", r.num, r.generation);
    write_object(obj, out);
    out.extend_from_slice(b"\nendobj\n");
}

/// Serialized form of one value.
pub fn to_bytes(obj: &PdfObject) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(obj, &mut out);
    out
}

//! PDF tokenizer.
//!
//! Splits a byte source into lexical tokens with random access through
//! `seek`/`tell`. No PDF object semantics live here.

use crate::error::{PdfError, Result};
use bytes::Bytes;

/// PDF keywords. Object-level keywords are zero-allocation variants;
/// everything else (content operators, junk) lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    True,
    False,
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"true" => Self::True,
            b"false" => Self::False,
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            _ => Self::Other(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::True => b"true",
            Self::False => b"false",
            Self::Null => b"null",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::R => b"R",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Other(b) => b,
        }
    }
}

/// One lexical unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Real(f64),
    /// Decoded string bytes, remembering whether it was written as `<hex>`.
    String { bytes: Vec<u8>, hex: bool },
    /// Name bytes without the slash, `#xx` escapes decoded.
    Name(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(Keyword),
    /// Comment text after `%`, only produced when comments are requested.
    Comment(Vec<u8>),
    Eof,
}

impl Token {
    pub fn is_keyword(&self, kw: &Keyword) -> bool {
        matches!(self, Token::Keyword(k) if k == kw)
    }
}

/// Check if byte is PDF whitespace
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

/// Check if byte is a PDF delimiter
pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

const fn is_token_end(b: u8) -> bool {
    is_whitespace(b) || is_delimiter(b)
}

/// Tokenizer over a shared byte source.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    data: Bytes,
    pos: usize,
    token_pos: usize,
    emit_comments: bool,
}

impl Tokenizer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            token_pos: 0,
            emit_comments: false,
        }
    }

    /// Underlying bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position in the source
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Start offset of the token most recently returned.
    pub fn token_start(&self) -> usize {
        self.token_pos
    }

    /// Move to an absolute position; positions past the end read as EOF.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        self.token_pos = self.pos;
    }

    /// Return comments as `Token::Comment` instead of skipping them.
    pub fn set_emit_comments(&mut self, emit: bool) {
        self.emit_comments = emit;
    }

    /// Peek at current byte without advancing
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Some(b)
    }

    /// Zero-copy slice of the source.
    pub fn slice(&self, start: usize, end: usize) -> Bytes {
        let end = end.min(self.data.len());
        let start = start.min(end);
        self.data.slice(start..end)
    }

    /// Read bytes up to (not including) the next EOL and consume the EOL.
    pub fn read_line(&mut self) -> Option<&[u8]> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b'\r' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        let end = self.pos;
        if self.peek_byte() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek_byte() == Some(b'\n') {
            self.pos += 1;
        }
        Some(&self.data[start..end])
    }

    /// Skip whitespace, and comments unless they are being emitted.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b == b'%' && !self.emit_comments {
                self.skip_comment();
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) -> (usize, usize) {
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b'\r' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        (start, self.pos)
    }

    /// Parse a name (/Name)
    fn parse_name(&mut self) -> Token {
        self.advance(); // Skip '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek_byte() {
            if is_token_end(b) {
                break;
            }
            if b == b'#'
                && let (Some(c1), Some(c2)) = (self.peek_at(1), self.peek_at(2))
                && let (Some(h), Some(l)) = (hex_value(c1), hex_value(c2))
            {
                self.pos += 3;
                name.push((h << 4) | l);
                continue;
            }
            // A malformed escape keeps its literal bytes.
            name.push(b);
            self.pos += 1;
        }

        Token::Name(name)
    }

    /// Parse a number (integer or real).
    ///
    /// Repeated signs (`--5`) are tolerated; the last sign wins. A lone sign
    /// or dot reads as zero.
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut negative = false;
        while let Some(b) = self.peek_byte() {
            match b {
                b'-' => negative = true,
                b'+' => negative = false,
                _ => break,
            }
            self.pos += 1;
        }

        let digits_start = self.pos;
        let mut has_dot = false;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        // Stray signs glued after the digits ("12-") are swallowed.
        while matches!(self.peek_byte(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
        }

        let digits = &self.data[digits_start..self.pos];
        let digits = &digits[..digits
            .iter()
            .position(|&b| b == b'-' || b == b'+')
            .unwrap_or(digits.len())];
        let text = std::str::from_utf8(digits).map_err(|_| PdfError::TokenError {
            pos: start,
            msg: "invalid number".into(),
        })?;

        if text.is_empty() || text == "." {
            return Ok(if has_dot { Token::Real(0.0) } else { Token::Integer(0) });
        }

        if !has_dot && let Ok(v) = text.parse::<i64>() {
            return Ok(Token::Integer(if negative { -v } else { v }));
        }

        let v: f64 = text.parse().map_err(|_| PdfError::TokenError {
            pos: start,
            msg: format!("invalid real: {}", text),
        })?;
        Ok(Token::Real(if negative { -v } else { v }))
    }

    /// Parse a literal string (...)
    fn parse_string(&mut self) -> Result<Token> {
        self.advance(); // Skip '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'(') => result.push(b'('),
                    Some(b')') => result.push(b')'),
                    Some(b'\\') => result.push(b'\\'),
                    Some(b'\r') => {
                        // Line continuation
                        if self.peek_byte() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c @ b'0'..=b'7') => {
                        let mut octal = (c - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek_byte() {
                                Some(d @ b'0'..=b'7') => {
                                    self.advance();
                                    octal = octal * 8 + (d - b'0') as u32;
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // Unknown escape: the backslash is dropped.
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(b'\r') => {
                    if self.peek_byte() == Some(b'\n') {
                        self.advance();
                    }
                    result.push(b'\n');
                }
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String {
            bytes: result,
            hex: false,
        })
    }

    /// Parse a hex string <...>
    fn parse_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // Skip '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| PdfError::TokenError {
                        pos: self.pos - 1,
                        msg: format!("invalid hex string character {:?}", c as char),
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => {
                    self.pos = start;
                    return Err(PdfError::UnexpectedEof);
                }
            }
        }

        // Odd final nibble is padded with zero.
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(Token::String {
            bytes: result,
            hex: true,
        })
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if is_token_end(b) {
                break;
            }
            self.pos += 1;
        }
        Token::Keyword(Keyword::from_bytes(&self.data[start..self.pos]))
    }

    /// Advance over exactly one lexical unit.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        self.token_pos = self.pos;
        let Some(b) = self.peek_byte() else {
            return Ok(Token::Eof);
        };

        match b {
            b'%' => {
                let (start, end) = self.skip_comment();
                Ok(Token::Comment(self.data[start..end].to_vec()))
            }
            b'/' => Ok(self.parse_name()),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::DictStart)
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::DictEnd)
                } else {
                    Err(PdfError::TokenError {
                        pos: self.pos,
                        msg: "unexpected '>'".into(),
                    })
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b')' | b'{' | b'}' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::Other(vec![b])))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        }
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

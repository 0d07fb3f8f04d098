//! PDF object parser - builds PDF values from tokens.

use super::lexer::{Keyword, Token, Tokenizer, is_whitespace};
use crate::error::{PdfError, Result};
use crate::model::{NameTable, ObjRef, PdfDictionary, PdfObject, PdfStream, PdfString};
use smallvec::SmallVec;

/// Positioned token awaiting reuse.
type Lookahead = (usize, Token);

/// Deepest array/dictionary nesting accepted.
pub const MAX_NESTING: usize = 256;

/// PDF object parser.
///
/// Keeps a two-token lookahead so that `N G R` (reference), `N G obj`
/// (object header) and a bare number can be told apart.
#[derive(Debug)]
pub struct ObjectParser {
    tokens: Tokenizer,
    lookahead: SmallVec<[Lookahead; 2]>,
    names: NameTable,
    depth: usize,
}

impl ObjectParser {
    pub fn new(tokens: Tokenizer) -> Self {
        Self::with_names(tokens, NameTable::new())
    }

    /// Parser that interns names into an existing table.
    pub fn with_names(tokens: Tokenizer, names: NameTable) -> Self {
        Self {
            tokens,
            lookahead: SmallVec::new(),
            names,
            depth: 0,
        }
    }

    /// Parser over an in-memory buffer.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Tokenizer::new(bytes::Bytes::copy_from_slice(data)))
    }

    /// Give back the interning table for reuse.
    pub fn into_names(self) -> NameTable {
        self.names
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokens
    }

    /// Reposition; pending lookahead is discarded.
    pub fn seek(&mut self, pos: usize) {
        self.lookahead.clear();
        self.depth = 0;
        self.tokens.seek(pos);
    }

    /// Position of the next unconsumed token.
    pub fn tell(&self) -> usize {
        match self.lookahead.last() {
            Some((pos, _)) => *pos,
            None => self.tokens.tell(),
        }
    }

    /// Get next token (from lookahead or tokenizer)
    pub(crate) fn next_token(&mut self) -> Result<Token> {
        Ok(self.next_positioned()?.1)
    }

    fn next_positioned(&mut self) -> Result<Lookahead> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(tok);
        }
        let tok = self.tokens.next_token()?;
        Ok((self.tokens.token_start(), tok))
    }

    /// Push token back to lookahead
    pub(crate) fn push_back(&mut self, tok: Lookahead) {
        self.lookahead.push(tok);
    }

    /// Read one value starting at the current position.
    pub fn read_object(&mut self) -> Result<PdfObject> {
        let outer = self.depth;
        let mut token = self.next_positioned()?;
        while matches!(token.1, Token::Comment(_)) {
            token = self.next_positioned()?;
        }
        let result = self.token_to_object(token);
        if result.is_err() {
            self.depth = outer;
        }
        result
    }

    /// Read `N G obj <value> [endobj]`.
    ///
    /// A dictionary followed by `stream` yields a pending stream whose data
    /// offset is recorded but not read. A missing `endobj` is tolerated.
    pub fn read_indirect_object(&mut self) -> Result<(ObjRef, PdfObject)> {
        let (pos, num) = self.next_positioned()?;
        let (_, generation) = self.next_positioned()?;
        let (_, kw) = self.next_positioned()?;
        let obj_ref = match (num, generation, kw) {
            (Token::Integer(n), Token::Integer(g), Token::Keyword(Keyword::Obj))
                if (0..=u32::MAX as i64).contains(&n) && (0..=65535).contains(&g) =>
            {
                ObjRef::new(n as u32, g as u16)
            }
            (num, generation, kw) => {
                return Err(PdfError::SyntaxError(format!(
                    "expected object header at {}, found {:?} {:?} {:?}",
                    pos, num, generation, kw
                )));
            }
        };

        let value = self.read_object()?;
        if !matches!(value, PdfObject::Stream(_)) {
            let next = self.next_positioned()?;
            if !next.1.is_keyword(&Keyword::EndObj) {
                self.push_back(next);
            }
        }
        Ok((obj_ref, value))
    }

    /// Convert a token to a PDF object
    fn token_to_object(&mut self, (pos, token): Lookahead) -> Result<PdfObject> {
        match token {
            Token::Integer(n) => self.integer_or_reference(n),
            Token::Real(v) => Ok(PdfObject::Number(v)),
            Token::String { bytes, hex } => Ok(PdfObject::String(PdfString {
                bytes,
                hex,
                ..Default::default()
            })),
            Token::Name(bytes) => Ok(PdfObject::Name(self.names.intern(&bytes))),
            Token::ArrayStart => self.parse_array(pos),
            Token::DictStart => self.parse_dict(pos),
            Token::Keyword(Keyword::True) => Ok(PdfObject::Boolean(true)),
            Token::Keyword(Keyword::False) => Ok(PdfObject::Boolean(false)),
            Token::Keyword(Keyword::Null) => Ok(PdfObject::Null),
            Token::Comment(_) => self.read_object(),
            Token::Eof => Err(PdfError::UnexpectedEof),
            Token::ArrayEnd => Err(PdfError::SyntaxError(format!("unexpected ']' at {}", pos))),
            Token::DictEnd => Err(PdfError::SyntaxError(format!("unexpected '>>' at {}", pos))),
            Token::Keyword(kw) => Err(PdfError::SyntaxError(format!(
                "unexpected keyword '{}' at {}",
                String::from_utf8_lossy(kw.as_bytes()),
                pos
            ))),
        }
    }

    fn integer_or_reference(&mut self, n: i64) -> Result<PdfObject> {
        let second = self.next_positioned()?;
        if let Token::Integer(g) = second.1 {
            let third = self.next_positioned()?;
            if third.1.is_keyword(&Keyword::R)
                && let (Ok(num), Ok(generation)) = (u32::try_from(n), u16::try_from(g))
            {
                return Ok(PdfObject::Reference(ObjRef::new(num, generation)));
            }
            self.push_back(third);
        }
        self.push_back(second);
        Ok(PdfObject::Number(n as f64))
    }

    fn enter(&mut self, pos: usize) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(PdfError::SyntaxError(format!(
                "nesting deeper than {} at {}",
                MAX_NESTING, pos
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, pos: usize) -> Result<PdfObject> {
        self.enter(pos)?;
        let mut arr = Vec::new();
        loop {
            let token = self.next_positioned()?;
            if token.1 == Token::ArrayEnd {
                break;
            }
            arr.push(self.token_to_object(token)?);
        }
        self.depth -= 1;
        Ok(PdfObject::Array(arr))
    }

    /// Parse dict contents until >>, then check for a following `stream`.
    fn parse_dict(&mut self, pos: usize) -> Result<PdfObject> {
        self.enter(pos)?;
        let mut dict = PdfDictionary::new();
        loop {
            let (pos, token) = self.next_positioned()?;
            let key = match token {
                Token::DictEnd => break,
                Token::Name(bytes) => self.names.intern(&bytes),
                Token::Eof => return Err(PdfError::UnexpectedEof),
                other => {
                    return Err(PdfError::SyntaxError(format!(
                        "expected name as dict key at {}, found {:?}",
                        pos, other
                    )));
                }
            };
            let value = self.read_object()?;
            // A null value is the same as an absent key.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        self.depth -= 1;

        if self.depth == 0 {
            let next = self.next_positioned()?;
            if next.1.is_keyword(&Keyword::Stream) && self.lookahead.is_empty() {
                let offset = self.skip_stream_eol();
                return Ok(PdfObject::Stream(Box::new(PdfStream::pending(dict, offset))));
            }
            self.push_back(next);
        }
        Ok(PdfObject::Dictionary(dict))
    }

    /// Consume the single EOL after the `stream` keyword and return the data
    /// offset. Spaces before the EOL are tolerated.
    fn skip_stream_eol(&mut self) -> usize {
        let data = self.tokens.data().clone();
        let mut pos = self.tokens.tell();
        while matches!(data.get(pos), Some(b' ' | b'\t' | b'\0' | b'\x0c')) {
            pos += 1;
        }
        match data.get(pos) {
            Some(b'\r') => {
                pos += 1;
                if data.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            Some(b'\n') => pos += 1,
            _ => {}
        }
        self.tokens.seek(pos);
        pos
    }
}

/// Content stream operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The operator (e.g., "BT", "Tf", "Tj")
    pub operator: Vec<u8>,
    /// Operands for this operation
    pub operands: Vec<PdfObject>,
}

impl Operation {
    pub fn operator_str(&self) -> &str {
        std::str::from_utf8(&self.operator).unwrap_or("")
    }
}

/// Content stream parser: splits operator bytes into operations.
pub struct ContentParser;

impl ContentParser {
    pub fn parse(data: &[u8]) -> Result<Vec<Operation>> {
        let mut parser = ObjectParser::from_slice(data);
        let mut ops = Vec::new();
        let mut operands = Vec::new();

        loop {
            let token = parser.next_positioned()?;
            match token.1 {
                Token::Eof => break,
                Token::Keyword(Keyword::Other(op)) => {
                    if op == b"BI" {
                        let (dict, image) = Self::inline_image(&mut parser)?;
                        operands.push(PdfObject::Dictionary(dict));
                        operands.push(PdfObject::string(image));
                    }
                    ops.push(Operation {
                        operator: op,
                        operands: std::mem::take(&mut operands),
                    });
                }
                _ => {
                    parser.push_back(token);
                    operands.push(parser.read_object()?);
                }
            }
        }
        Ok(ops)
    }

    /// Read `key value ... ID <data> EI` following `BI`.
    fn inline_image(parser: &mut ObjectParser) -> Result<(PdfDictionary, Vec<u8>)> {
        let mut dict = PdfDictionary::new();
        loop {
            match parser.next_token()? {
                Token::Keyword(Keyword::Other(op)) if op == b"ID" => break,
                Token::Name(key) => {
                    let key = parser.names.intern(&key);
                    let value = parser.read_object()?;
                    dict.insert(key, value);
                }
                Token::Eof => return Err(PdfError::UnexpectedEof),
                other => {
                    return Err(PdfError::SyntaxError(format!(
                        "unexpected {:?} in inline image dictionary",
                        other
                    )));
                }
            }
        }

        let data = parser.tokens.data().clone();
        let start = parser.tokens.tell() + 1;
        let mut pos = start;
        while pos + 2 <= data.len() {
            if &data[pos..pos + 2] == b"EI"
                && pos > start
                && is_whitespace(data[pos - 1])
                && data.get(pos + 2).is_none_or(|&b| is_whitespace(b))
            {
                let image = data[start..pos - 1].to_vec();
                parser.seek(pos + 2);
                return Ok((dict, image));
            }
            pos += 1;
        }
        Err(PdfError::SyntaxError("inline image without EI".into()))
    }
}

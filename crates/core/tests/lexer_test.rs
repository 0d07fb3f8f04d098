//! Tokenizer tests.

use vellum_core::parser::{Keyword, Token, Tokenizer};

fn tokens(data: &[u8]) -> Vec<Token> {
    let mut t = Tokenizer::new(data.to_vec());
    let mut out = Vec::new();
    loop {
        match t.next_token().unwrap() {
            Token::Eof => break,
            tok => out.push(tok),
        }
    }
    out
}

fn kw(b: &[u8]) -> Token {
    Token::Keyword(Keyword::from_bytes(b))
}

fn lit(b: &[u8]) -> Token {
    Token::String {
        bytes: b.to_vec(),
        hex: false,
    }
}

fn hex(b: &[u8]) -> Token {
    Token::String {
        bytes: b.to_vec(),
        hex: true,
    }
}

const TESTDATA: &[u8] = br#"%!PS
begin end
 "  @ #
/a/BCD /Some_Name /foo#5f#xbaa
0 +1 -2 .5 1.234
(abc) () (abc ( def ) ghi)
(def\040\0\0404ghi) (bach\\slask) (foo\nbaa)
(this % is not a comment.)
(foo
baa)
(foo\
baa)
<> <20> < 40 4020 >
<abcd00
12345>
func/a/b{(c)do*}def
[ 1 (z) ! ]
<< /foo (bar) >>
"#;

#[test]
fn test_tokenize_mixed_stream() {
    let expected = vec![
        kw(b"begin"),
        kw(b"end"),
        kw(b"\""),
        kw(b"@"),
        kw(b"#"),
        Token::Name(b"a".to_vec()),
        Token::Name(b"BCD".to_vec()),
        Token::Name(b"Some_Name".to_vec()),
        Token::Name(b"foo_#xbaa".to_vec()),
        Token::Integer(0),
        Token::Integer(1),
        Token::Integer(-2),
        Token::Real(0.5),
        Token::Real(1.234),
        lit(b"abc"),
        lit(b""),
        lit(b"abc ( def ) ghi"),
        lit(b"def \x00 4ghi"),
        lit(b"bach\\slask"),
        lit(b"foo\nbaa"),
        lit(b"this % is not a comment."),
        lit(b"foo\nbaa"),
        lit(b"foobaa"),
        hex(b""),
        hex(b" "),
        hex(b"@@ "),
        hex(b"\xab\xcd\x00\x12\x34\x50"),
        kw(b"func"),
        Token::Name(b"a".to_vec()),
        Token::Name(b"b".to_vec()),
        kw(b"{"),
        lit(b"c"),
        kw(b"do*"),
        kw(b"}"),
        kw(b"def"),
        Token::ArrayStart,
        Token::Integer(1),
        lit(b"z"),
        kw(b"!"),
        Token::ArrayEnd,
        Token::DictStart,
        Token::Name(b"foo".to_vec()),
        lit(b"bar"),
        Token::DictEnd,
    ];
    assert_eq!(tokens(TESTDATA), expected);
}

#[test]
fn test_lenient_numbers() {
    assert_eq!(
        tokens(b"--5 +-5 - . 5. -.25"),
        vec![
            Token::Integer(-5),
            Token::Integer(-5),
            Token::Integer(0),
            Token::Real(0.0),
            Token::Real(5.0),
            Token::Real(-0.25),
        ]
    );
}

#[test]
fn test_string_line_endings_normalized() {
    assert_eq!(tokens(b"(a\r\nb\rc)"), vec![lit(b"a\nb\nc")]);
}

#[test]
fn test_octal_escapes() {
    assert_eq!(tokens(br"(\101\1012\7)"), vec![lit(b"AA2\x07")]);
}

#[test]
fn test_invalid_hex_string_is_token_error() {
    let mut t = Tokenizer::new(b"<12zz>".to_vec());
    let err = t.next_token().unwrap_err();
    assert!(matches!(err, vellum_core::PdfError::TokenError { .. }));
}

#[test]
fn test_comments_skipped_unless_requested() {
    assert_eq!(tokens(b"1 % note\n2"), vec![Token::Integer(1), Token::Integer(2)]);

    let mut t = Tokenizer::new(b"1 % note\n2".to_vec());
    t.set_emit_comments(true);
    assert_eq!(t.next_token().unwrap(), Token::Integer(1));
    assert_eq!(t.next_token().unwrap(), Token::Comment(b" note".to_vec()));
    assert_eq!(t.next_token().unwrap(), Token::Integer(2));
}

#[test]
fn test_object_keywords() {
    assert_eq!(
        tokens(b"1 0 obj null true false endobj xref trailer startxref R stream endstream"),
        vec![
            Token::Integer(1),
            Token::Integer(0),
            Token::Keyword(Keyword::Obj),
            Token::Keyword(Keyword::Null),
            Token::Keyword(Keyword::True),
            Token::Keyword(Keyword::False),
            Token::Keyword(Keyword::EndObj),
            Token::Keyword(Keyword::Xref),
            Token::Keyword(Keyword::Trailer),
            Token::Keyword(Keyword::StartXref),
            Token::Keyword(Keyword::R),
            Token::Keyword(Keyword::Stream),
            Token::Keyword(Keyword::EndStream),
        ]
    );
}

#[test]
fn test_seek_tell_and_token_start() {
    let mut t = Tokenizer::new(b"  /Name 42".to_vec());
    assert_eq!(t.next_token().unwrap(), Token::Name(b"Name".to_vec()));
    assert_eq!(t.token_start(), 2);
    assert_eq!(t.tell(), 7);
    t.seek(8);
    assert_eq!(t.next_token().unwrap(), Token::Integer(42));
    assert_eq!(t.next_token().unwrap(), Token::Eof);
}

#[test]
fn test_read_line_handles_crlf() {
    let mut t = Tokenizer::new(b"first\r\nsecond\rthird".to_vec());
    assert_eq!(t.read_line(), Some(&b"first"[..]));
    assert_eq!(t.read_line(), Some(&b"second"[..]));
    assert_eq!(t.read_line(), Some(&b"third"[..]));
    assert_eq!(t.read_line(), None);
}

// Byte-level and comment errors, with their exact rendered positions.

use apifmt::lexer::{tokenize, ScanMode};
use apifmt::token::Token;

fn lex_errors(input: &[u8]) -> Vec<String> {
    let (_, diags) = tokenize("e.api", input, ScanMode::default());
    diags.iter().map(|d| d.to_string()).collect()
}

struct ErrorCase {
    input: &'static [u8],
    want: &'static [&'static str],
}

#[rustfmt::skip]
const ERROR_TESTS: &[ErrorCase] = &[
    ErrorCase { input: b"type A {}", want: &[] },
    ErrorCase { input: b"a\x00b", want: &["e.api:1:2: illegal character NUL"] },
    ErrorCase { input: b"a\n\x00", want: &["e.api:2:1: illegal character NUL"] },
    ErrorCase { input: b"a\xffb", want: &["e.api:1:2: illegal UTF-8 encoding"] },
    ErrorCase { input: b"\xc3", want: &["e.api:1:1: illegal UTF-8 encoding"] },
    ErrorCase { input: b"\xef\xbb\xbftype", want: &[] },
    ErrorCase { input: b"a \xef\xbb\xbf", want: &["e.api:1:3: illegal byte order mark"] },
    ErrorCase { input: b"/* abc", want: &["e.api:1:1: comment not terminated"] },
    ErrorCase { input: b"x /*", want: &["e.api:1:3: comment not terminated"] },
    ErrorCase { input: b"\"abc", want: &["e.api:1:1: string literal not terminated"] },
    ErrorCase { input: b"a\n  `x", want: &["e.api:2:3: raw string literal not terminated"] },
    ErrorCase {
        input: b"\x00\xff",
        want: &["e.api:1:1: illegal character NUL", "e.api:1:2: illegal UTF-8 encoding"],
    },
];

#[test]
fn error_table() {
    for c in ERROR_TESTS {
        let got = lex_errors(c.input);
        assert_eq!(got, c.want, "input={:?}", String::from_utf8_lossy(c.input));
    }
}

#[test]
fn leading_bom_is_not_a_token() {
    let (toks, diags) = tokenize("e.api", b"\xef\xbb\xbftype", ScanMode::default());
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(toks[0].0.offset(), 3);
    assert_eq!(toks[0].2, "type");
}

#[test]
fn bad_utf8_keeps_offsets() {
    let (toks, _) = tokenize("e.api", b"\xff\xfe ok", ScanMode::default());
    let ok = toks.iter().find(|(_, _, lit)| lit == "ok");
    assert_eq!(ok.map(|(pos, _, _)| pos.offset()), Some(3));
}

#[test]
fn errors_do_not_stop_the_scan() {
    let (toks, diags) = tokenize("e.api", b"a\x00 b\n\"c\nd", ScanMode::default());
    assert_eq!(diags.len(), 2, "{diags:?}");
    let kinds: Vec<_> = toks.iter().map(|(_, t, _)| *t).collect();
    assert_eq!(
        kinds,
        [
            Token::Ident,
            Token::Ident,
            Token::Semicolon,
            Token::String,
            Token::Semicolon,
            Token::Ident,
            Token::Semicolon,
        ]
    );
}

#[test]
fn diagnostics_are_in_source_order() {
    let (_, diags) = tokenize("e.api", b"\"a\n`b\n/* c", ScanMode::default());
    let offsets: Vec<_> = diags.iter().map(|d| d.pos.offset).collect();
    assert_eq!(offsets, [0, 3]);
}

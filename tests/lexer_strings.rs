use apifmt::lexer::{tokenize, ScanMode};
use apifmt::token::Token;
use apifmt::Diag;

fn lex_all(input: &str) -> (Vec<(usize, Token, String)>, Vec<Diag>) {
    let (toks, diags) = tokenize("s.api", input.as_bytes(), ScanMode::default());
    let toks = toks
        .into_iter()
        .map(|(pos, tok, lit)| (pos.offset(), tok, lit))
        .collect();
    (toks, diags)
}

fn lex1(input: &str) -> ((usize, Token, String), Vec<Diag>) {
    let (mut toks, diags) = lex_all(input);
    assert!(!toks.is_empty(), "no tokens for <<{input}>>");
    (toks.remove(0), diags)
}

/// `(offset, message)` pairs.
fn errors(diags: &[Diag]) -> Vec<(usize, String)> {
    diags
        .iter()
        .map(|d| (d.pos.offset, d.message.clone()))
        .collect()
}

#[test]
fn raw_string_basic() {
    let ((_, t, lit), diags) = lex1("`abc`");
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(t, Token::String);
    assert_eq!(lit, "`abc`");
}

#[test]
fn raw_string_spans_lines_and_drops_cr() {
    let ((_, t, lit), diags) = lex1("`a\r\nb\rc`");
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(t, Token::String);
    assert_eq!(lit, "`a\nbc`");
}

#[test]
fn raw_string_keeps_escapes_verbatim() {
    let ((_, _, lit), diags) = lex1(r"`json:\q`");
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(lit, r"`json:\q`");
}

#[test]
fn interpreted_string_basic_escapes_ok() {
    for s in [
        r#""\n""#,
        r#""\t""#,
        r#""\\\"""#,
        r#""\a\b\f\r\v""#,
        r#""\101""#,
        r#""\x41""#,
        r#""A""#,
        r#""\U00000041""#,
        r#""日本語""#,
    ] {
        let ((_, t, lit), diags) = lex1(s);
        assert!(diags.is_empty(), "{s} produced diags: {diags:?}");
        assert_eq!(t, Token::String);
        assert_eq!(lit, s);
    }
}

#[test]
fn literal_keeps_its_quotes() {
    let (toks, diags) = lex_all(r#"title: "user api""#);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(toks[2], (7, Token::String, r#""user api""#.to_string()));
}

#[rustfmt::skip]
const ESCAPE_ERRORS: &[(&str, usize, &str)] = &[
    (r#""\q""#, 2, "unknown escape sequence"),
    (r#""\'""#, 2, "unknown escape sequence"),
    (r#""\400""#, 2, "escape sequence is invalid Unicode code point"),
    (r#""\x4g""#, 4, "illegal character U+0067 'g' in escape sequence"),
    (r#""\uD800""#, 2, "escape sequence is invalid Unicode code point"),
    (r#""\U00110000""#, 2, "escape sequence is invalid Unicode code point"),
    (r#""\u12""#, 5, "illegal character U+0022 '\"' in escape sequence"),
];

#[test]
fn escape_errors_table() {
    for &(src, offset, msg) in ESCAPE_ERRORS {
        let ((_, t, lit), diags) = lex1(src);
        assert_eq!(t, Token::String, "{src}");
        assert_eq!(lit, src, "{src}");
        assert_eq!(errors(&diags).first(), Some(&(offset, msg.to_string())), "{src}");
    }
}

#[test]
fn unterminated_string_at_eof() {
    let (toks, diags) = lex_all("\"abc");
    assert_eq!(errors(&diags), [(0, "string literal not terminated".to_string())]);
    assert_eq!(toks[0], (0, Token::String, "\"abc".to_string()));
}

#[test]
fn unterminated_string_stops_at_newline() {
    let (toks, diags) = lex_all("\"ab\ncd");
    assert_eq!(errors(&diags), [(0, "string literal not terminated".to_string())]);
    let lits: Vec<_> = toks.iter().map(|(_, _, lit)| lit.as_str()).collect();
    assert_eq!(lits, ["\"ab", "\n", "cd", "\n"]);
}

#[test]
fn backslash_at_eof() {
    let (_, diags) = lex_all("\"\\");
    let got = errors(&diags);
    assert!(got.contains(&(2, "escape sequence not terminated".to_string())), "{got:?}");
    assert!(got.contains(&(0, "string literal not terminated".to_string())), "{got:?}");
}

#[test]
fn unterminated_raw_string() {
    let (toks, diags) = lex_all("x `abc\ndef");
    assert_eq!(errors(&diags), [(2, "raw string literal not terminated".to_string())]);
    assert_eq!(toks[1], (2, Token::String, "`abc\ndef".to_string()));
}

//! Scanner for `.api` sources.
//!
//! Two layers, as usual for a logos-based lexer:
//!
//! - [`RawTok`] is the logos DFA. Identifiers, strings and comments are
//!   munched by callbacks that record their own errors in the lexer extras.
//! - [`Scanner`] drives it: statement-terminator insertion, comment
//!   handling, line directives and diagnostics.
//!
//! Byte-level faults (NUL, malformed UTF-8, stray byte-order marks) are found
//! once up front by [`SourceText`] and reported as the scan passes them.

use std::borrow::Cow;
use std::ops::Range;

use logos::{Lexer as LogosLexer, Logos};
use memchr::{memchr, memmem};

use crate::error::{Diag, LexErrorKind};
use crate::position::{self, Pos, SourceFile};
use crate::token::Token;

const BOM: char = '\u{FEFF}';

/// Stand-in for each byte of a malformed UTF-8 sequence. Such input never
/// formats successfully, so the substitution is only visible in literals.
const REPLACEMENT_BYTE: char = '\u{1A}';

/// Line/column numbers above this are rejected in line directives.
const MAX_LINE_COL: u64 = (1 << 30) - 1;

// =============================================================================
// 0. Source validation
// =============================================================================

/// Source bytes checked once for encoding problems.
///
/// The text keeps byte offsets identical to the input: every invalid byte is
/// replaced by a single one-byte stand-in.
#[derive(Debug, Clone)]
pub struct SourceText<'a> {
    text: Cow<'a, str>,
    faults: Vec<(usize, LexErrorKind)>,
}

impl<'a> SourceText<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let mut faults = Vec::new();
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => Cow::Borrowed(s),
            Err(_) => Cow::Owned(repair_utf8(bytes, &mut faults)),
        };

        for i in memchr::memchr_iter(0, text.as_bytes()) {
            faults.push((i, LexErrorKind::IllegalNul));
        }
        for (i, _) in text.match_indices(BOM) {
            if i > 0 {
                faults.push((i, LexErrorKind::MisplacedBom));
            }
        }
        faults.sort_by_key(|&(offset, _)| offset);

        Self { text, faults }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn repair_utf8(bytes: &[u8], faults: &mut Vec<(usize, LexErrorKind)>) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    let mut base = 0;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                let bad = e.error_len().unwrap_or(rest.len() - valid);
                for k in 0..bad {
                    faults.push((base + valid + k, LexErrorKind::IllegalUtf8));
                    out.push(REPLACEMENT_BYTE);
                }
                base += valid + bad;
                rest = &rest[valid + bad..];
            }
        }
    }
}

// =============================================================================
// 1. Callback helpers
// =============================================================================

#[derive(Debug, Default)]
struct Extras {
    errors: Vec<(usize, LexErrorKind)>,
}

#[inline(always)]
const fn ends_ident(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | '=' | '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' | ':'
    )
}

/// Munches the rest of a word. A `:` directly after `/` stays inside it, so
/// `/users/:id` is one identifier.
fn lex_ident(lex: &mut LogosLexer<'_, RawTok>) {
    let mut prev = lex.slice().chars().last();
    let mut len = 0;
    for c in lex.remainder().chars() {
        let keep = (c == ':' && prev == Some('/')) || !ends_ident(c);
        if !keep {
            break;
        }
        len += c.len_utf8();
        prev = Some(c);
    }
    lex.bump(len);
}

fn lex_line_comment(lex: &mut LogosLexer<'_, RawTok>) {
    let rem = lex.remainder().as_bytes();
    let len = memchr(b'\n', rem).unwrap_or(rem.len());
    lex.bump(len);
}

fn lex_block_comment(lex: &mut LogosLexer<'_, RawTok>) {
    let start = lex.span().start;
    let rem = lex.remainder().as_bytes();
    match memmem::find(rem, b"*/") {
        Some(i) => lex.bump(i + 2),
        None => {
            let len = rem.len();
            lex.bump(len);
            lex.extras
                .errors
                .push((start, LexErrorKind::UnterminatedComment));
        }
    }
}

fn lex_raw_string(lex: &mut LogosLexer<'_, RawTok>) {
    let start = lex.span().start;
    let rem = lex.remainder().as_bytes();
    match memchr(b'`', rem) {
        Some(i) => lex.bump(i + 1),
        None => {
            let len = rem.len();
            lex.bump(len);
            lex.extras
                .errors
                .push((start, LexErrorKind::UnterminatedRawString));
        }
    }
}

fn lex_string(lex: &mut LogosLexer<'_, RawTok>) {
    let start = lex.span().start;
    let rem = lex.remainder();
    let base = start + 1;
    let mut errors = Vec::new();

    let mut i = 0;
    let len = loop {
        let Some(c) = rem[i..].chars().next() else {
            errors.push((start, LexErrorKind::UnterminatedString));
            break rem.len();
        };
        match c {
            '\n' => {
                errors.push((start, LexErrorKind::UnterminatedString));
                break i;
            }
            '"' => break i + 1,
            '\\' => i = scan_escape(rem, i + 1, base, '"', &mut errors),
            _ => i += c.len_utf8(),
        }
    };

    lex.bump(len);
    lex.extras.errors.extend(errors);
}

/// Validates one escape sequence starting at `rem[at..]`, just past the
/// backslash. Returns the index to resume from; on error the offending
/// character is left unconsumed.
fn scan_escape(
    rem: &str,
    at: usize,
    base: usize,
    quote: char,
    errors: &mut Vec<(usize, LexErrorKind)>,
) -> usize {
    let Some(c) = rem[at..].chars().next() else {
        errors.push((base + at, LexErrorKind::UnterminatedEscape));
        return at;
    };

    let (digits, radix, max, mut i): (usize, u32, u32, usize) = match c {
        'a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' | '\\' => return at + 1,
        c if c == quote => return at + 1,
        '0'..='7' => (3, 8, 255, at),
        'x' => (2, 16, 255, at + 1),
        'u' => (4, 16, 0x10_FFFF, at + 1),
        'U' => (8, 16, 0x10_FFFF, at + 1),
        _ => {
            errors.push((base + at, LexErrorKind::UnknownEscape));
            return at;
        }
    };

    let mut x: u32 = 0;
    for _ in 0..digits {
        let Some(d) = rem[i..].chars().next() else {
            errors.push((base + i, LexErrorKind::UnterminatedEscape));
            return i;
        };
        let Some(v) = d.to_digit(radix) else {
            errors.push((base + i, LexErrorKind::IllegalEscapeChar(d)));
            return i;
        };
        x = x.wrapping_mul(radix).wrapping_add(v);
        i += 1;
    }

    if x > max || (0xD800..0xE000).contains(&x) {
        errors.push((base + at, LexErrorKind::InvalidCodePoint));
    }
    i
}

// =============================================================================
// 2. Token definition (RawTok)
// =============================================================================

#[repr(u8)]
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(extras = Extras)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r]+")]
#[rustfmt::skip]
enum RawTok {
    #[token("\n")] Newline,
    #[token("//", lex_line_comment)] LineComment,
    #[token("/*", lex_block_comment)] BlockComment,

    #[token("\"", lex_string)] String,
    #[token("`", lex_raw_string)] RawString,

    #[token("*")] Mul,
    #[token("=")] Assign,
    #[token("(")] LParen,
    #[token("[")] LBrack,
    #[token("{")] LBrace,
    #[token(",")] Comma,
    #[token(")")] RParen,
    #[token("]")] RBrack,
    #[token("}")] RBrace,
    #[token(";")] Semicolon,
    #[token(":")] Colon,
    #[token("~")] Tilde,

    // Any other character starts a word (lowest priority).
    #[regex(r"[^ \t\r\n=()\[\]{},;:]", lex_ident, priority = 0)] Ident,
}

// =============================================================================
// 3. Lookup tables
// =============================================================================

const RAW_KINDS: usize = 32;

macro_rules! gen_lookup_table {
    (bool, $size:expr, $($variant:ident),* $(,)?) => {{
        let mut table = [false; $size];
        $(table[RawTok::$variant as usize] = true;)*
        table
    }};
    ($enum:ty, $size:expr, $default:expr, $($variant:ident => $value:expr),* $(,)?) => {{
        let mut table: [$enum; $size] = [$default; $size];
        $(table[RawTok::$variant as usize] = $value;)*
        table
    }};
}

const SEMI_INSERT_TABLE: [bool; RAW_KINDS] = gen_lookup_table!(
    bool,
    RAW_KINDS,
    Ident,
    String,
    RawString,
    RParen,
    RBrack,
    RBrace,
    Tilde,
);

const TOKEN_TABLE: [Token; RAW_KINDS] = gen_lookup_table!(
    Token, RAW_KINDS, Token::Illegal,
    LineComment => Token::Comment,
    BlockComment => Token::Comment,
    Ident => Token::Ident,
    String => Token::String,
    RawString => Token::String,
    Mul => Token::Mul,
    Assign => Token::Assign,
    LParen => Token::LParen,
    LBrack => Token::LBrack,
    LBrace => Token::LBrace,
    Comma => Token::Comma,
    RParen => Token::RParen,
    RBrack => Token::RBrack,
    RBrace => Token::RBrace,
    Semicolon => Token::Semicolon,
    Colon => Token::Colon,
    Tilde => Token::Tilde,
);

impl RawTok {
    #[inline(always)]
    const fn ends_statement(self) -> bool {
        SEMI_INSERT_TABLE[self as usize]
    }

    #[inline(always)]
    const fn token(self) -> Token {
        TOKEN_TABLE[self as usize]
    }
}

// =============================================================================
// 4. Scanner
// =============================================================================

/// What the scanner emits besides real tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMode {
    /// Return COMMENT tokens instead of skipping them.
    pub comments: bool,
    /// Synthesize `;` at line ends after statement-ending tokens.
    pub insert_semis: bool,
}

impl Default for ScanMode {
    fn default() -> Self {
        Self {
            comments: false,
            insert_semis: true,
        }
    }
}

/// `(position, kind, literal)`.
pub type Scanned<'a> = (Pos, Token, Cow<'a, str>);

pub struct Scanner<'a> {
    file: &'a mut SourceFile,
    logos: LogosLexer<'a, RawTok>,
    faults: &'a [(usize, LexErrorKind)],
    mode: ScanMode,
    pending: Option<Scanned<'a>>,
    diags: Vec<Diag>,
    error_count: usize,
    insert_semi: bool,
    src_len: usize,
    eof_done: bool,
}

impl<'a> Scanner<'a> {
    /// Prepares to scan `src`, which must be the contents `file` was
    /// registered for. A leading byte-order mark is skipped.
    pub fn new(file: &'a mut SourceFile, src: &'a SourceText<'_>, mode: ScanMode) -> Self {
        let text = src.as_str();
        file.set_lines_for_content(text.as_bytes());

        let mut logos = RawTok::lexer_with_extras(text, Extras::default());
        if text.starts_with(BOM) {
            logos.bump(BOM.len_utf8());
        }

        Self {
            file,
            logos,
            faults: &src.faults,
            mode,
            pending: None,
            diags: Vec::with_capacity(8),
            error_count: 0,
            insert_semi: false,
            src_len: text.len(),
            eof_done: false,
        }
    }

    #[inline]
    pub fn file(&self) -> &SourceFile {
        self.file
    }

    #[inline]
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Number of errors reported so far.
    #[inline]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn take_diags(&mut self) -> Vec<Diag> {
        std::mem::take(&mut self.diags)
    }

    /// Next token. Returns EOF (repeatedly) at the end of input.
    pub fn next_token(&mut self) -> Scanned<'a> {
        loop {
            if let Some(item) = self.pending.take() {
                return item;
            }

            let Some(next) = self.logos.next() else {
                return self.handle_eof();
            };

            let span = self.logos.span();
            self.drain_faults(span.end);
            for (offset, kind) in std::mem::take(&mut self.logos.extras.errors) {
                self.report(offset, &kind);
            }

            match next {
                Ok(raw) => {
                    if let Some(item) = self.handle_raw_token(raw, span) {
                        return item;
                    }
                }
                Err(kind) => {
                    self.report(span.start, &kind);
                    self.insert_semi = false;
                    let pos = self.file.pos(span.start);
                    return (pos, Token::Illegal, Cow::Borrowed(self.logos.slice()));
                }
            }
        }
    }

    #[inline]
    fn report(&mut self, offset: usize, kind: &LexErrorKind) {
        let pos = self.file.position(self.file.pos(offset));
        self.diags.push(Diag::lex(pos, kind));
        self.error_count += 1;
    }

    fn drain_faults(&mut self, limit: usize) {
        let faults = self.faults;
        let n = faults.iter().take_while(|&&(o, _)| o < limit).count();
        for (offset, kind) in &faults[..n] {
            self.report(*offset, kind);
        }
        self.faults = &faults[n..];
    }

    fn handle_eof(&mut self) -> Scanned<'a> {
        self.drain_faults(usize::MAX);
        let pos = self.file.pos(self.src_len);
        if self.insert_semi {
            self.insert_semi = false;
            return (pos, Token::Semicolon, Cow::Borrowed("\n"));
        }
        (pos, Token::Eof, Cow::Borrowed(""))
    }

    fn handle_raw_token(&mut self, raw: RawTok, span: Range<usize>) -> Option<Scanned<'a>> {
        let pos = self.file.pos(span.start);
        let slice: &'a str = self.logos.slice();

        let lit = match raw {
            RawTok::Newline => {
                if !self.insert_semi {
                    return None;
                }
                self.insert_semi = false;
                return Some((pos, Token::Semicolon, Cow::Borrowed("\n")));
            }
            RawTok::LineComment | RawTok::BlockComment => {
                return self.handle_comment(raw, span, slice);
            }
            RawTok::Ident | RawTok::String => Cow::Borrowed(slice),
            RawTok::RawString => strip_cr(slice, false),
            RawTok::Semicolon => Cow::Borrowed(";"),
            _ => Cow::Borrowed(""),
        };

        if self.mode.insert_semis {
            self.insert_semi = raw.ends_statement();
        }
        Some((pos, raw.token(), lit))
    }

    fn handle_comment(
        &mut self,
        raw: RawTok,
        span: Range<usize>,
        slice: &'a str,
    ) -> Option<Scanned<'a>> {
        let pos = self.file.pos(span.start);
        let block = raw == RawTok::BlockComment;
        let terminated = !block || (slice.len() >= 4 && slice.ends_with("*/"));

        let semi = self.insert_semi
            && comment_ends_line(slice, terminated, self.logos.remainder());
        self.insert_semi = false;

        // A `//` comment may end in "\r\n"; the final CR is not part of it.
        let lit = if block {
            slice
        } else {
            slice.strip_suffix('\r').unwrap_or(slice)
        };
        if terminated {
            self.line_directive(block, span, lit);
        }

        let comment = self
            .mode
            .comments
            .then(|| (pos, Token::Comment, strip_cr(lit, block)));
        if semi {
            self.pending = comment;
            return Some((pos, Token::Semicolon, Cow::Borrowed("\n")));
        }
        comment
    }

    // -------------------------------------------------------------------------
    // Line directives
    // -------------------------------------------------------------------------

    fn line_directive(&mut self, block: bool, span: Range<usize>, lit: &str) {
        const PREFIX: &str = "line ";

        if !lit[2..].starts_with(PREFIX) {
            return;
        }
        // `//line` only counts at the very beginning of a line.
        if !block && self.file.line_start(self.file.pos(span.start)) != span.start {
            return;
        }

        let next = if block {
            span.end
        } else if self.logos.remainder().starts_with('\n') {
            span.end + 1
        } else {
            span.end
        };
        let body = if block { &lit[..lit.len() - 2] } else { lit };
        self.update_line_info(next, span.start + 7, &body[7..]);
    }

    /// Interprets `[filename]:line[:col]`; `offs` is the offset of `text`.
    fn update_line_info(&mut self, next: usize, offs: usize, text: &str) {
        let Some((i, n)) = trailing_digits(text) else {
            return;
        };
        let Some(n) = n else {
            let tail = text[i..].to_string();
            self.report(offs + i, &LexErrorKind::InvalidLineNumber(tail));
            return;
        };

        let (line, col, line_at, name_end) = match trailing_digits(&text[..i - 1]) {
            Some((i2, Some(n2))) => {
                if n == 0 || n > MAX_LINE_COL {
                    let tail = text[i..].to_string();
                    self.report(offs + i, &LexErrorKind::InvalidColumnNumber(tail));
                    return;
                }
                (n2, n, i2, i2 - 1)
            }
            _ => (n, 0, i, i - 1),
        };

        if line == 0 || line > MAX_LINE_COL {
            let end = if col > 0 { i - 1 } else { text.len() };
            let tail = text[line_at..end].to_string();
            self.report(offs + line_at, &LexErrorKind::InvalidLineNumber(tail));
            return;
        }

        let name = &text[..name_end];
        let filename = if name.is_empty() && col > 0 {
            self.file.position(self.file.pos(offs)).filename
        } else if name.is_empty() {
            String::new()
        } else if position::is_abs(name) {
            position::clean_path(name)
        } else {
            position::join_dir(self.file.dir(), name)
        };

        self.file
            .add_line_column_info(next, filename, line as usize, col as usize);
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Scanned<'a>;

    /// Every token up to, not including, EOF.
    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_done {
            return None;
        }
        let item = self.next_token();
        if item.1 == Token::Eof {
            self.eof_done = true;
            return None;
        }
        Some(item)
    }
}

// =============================================================================
// 5. Free helpers
// =============================================================================

/// Index just past the last `:` and the number that follows it, if any.
/// `None` overall means there is no `:`.
fn trailing_digits(text: &str) -> Option<(usize, Option<u64>)> {
    let i = text.rfind(':')? + 1;
    let tail = &text[i..];
    let n = if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
        tail.parse::<u64>().ok()
    } else {
        None
    };
    Some((i, n))
}

/// Whether a comment runs to the end of its logical line: it is a `//`
/// comment, spans or runs out of lines, or only blanks and such comments
/// follow it before the newline.
fn comment_ends_line(comment: &str, terminated: bool, rest: &str) -> bool {
    if comment.starts_with("//") || !terminated || comment.contains('\n') {
        return true;
    }
    let mut rest = rest.as_bytes();
    loop {
        let blanks = rest
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\r'))
            .count();
        rest = &rest[blanks..];
        match rest {
            [] | [b'\n', ..] | [b'/', b'/', ..] => return true,
            [b'/', b'*', tail @ ..] => match memmem::find(tail, b"*/") {
                Some(end) if memchr(b'\n', &tail[..end]).is_none() => rest = &tail[end + 2..],
                _ => return true,
            },
            _ => return false,
        }
    }
}

/// Removes carriage returns. Inside a block comment a CR between `*` and the
/// closing `/` is kept so the comment still closes where it did.
fn strip_cr(s: &str, comment: bool) -> Cow<'_, str> {
    if !s.contains('\r') {
        return Cow::Borrowed(s);
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    for (j, ch) in s.char_indices() {
        let keep = ch != '\r'
            || (comment && out.len() > 2 && out.ends_with('*') && bytes.get(j + 1) == Some(&b'/'));
        if keep {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// Scans `src` in one go, returning every token before EOF and the
/// diagnostics. Convenience for tools and tests.
pub fn tokenize(filename: &str, src: &[u8], mode: ScanMode) -> (Vec<(Pos, Token, String)>, Vec<Diag>) {
    let text = SourceText::new(src);
    let mut file = SourceFile::new(filename, src.len());
    let mut scanner = Scanner::new(&mut file, &text, mode);
    let toks = scanner
        .by_ref()
        .map(|(pos, tok, lit)| (pos, tok, lit.into_owned()))
        .collect();
    let diags = scanner.take_diags();
    (toks, diags)
}

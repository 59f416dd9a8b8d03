use thiserror::Error;

use crate::position::Position;

// =============================================================================
// Lexical errors
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("invalid token")]
    InvalidToken,
    #[error("illegal character NUL")]
    IllegalNul,
    #[error("illegal UTF-8 encoding")]
    IllegalUtf8,
    #[error("illegal byte order mark")]
    MisplacedBom,
    #[error("string literal not terminated")]
    UnterminatedString,
    #[error("raw string literal not terminated")]
    UnterminatedRawString,
    #[error("comment not terminated")]
    UnterminatedComment,
    #[error("unknown escape sequence")]
    UnknownEscape,
    #[error("escape sequence not terminated")]
    UnterminatedEscape,
    #[error("illegal character {} in escape sequence", quote_rune(*.0))]
    IllegalEscapeChar(char),
    #[error("escape sequence is invalid Unicode code point")]
    InvalidCodePoint,
    #[error("invalid line number: {0}")]
    InvalidLineNumber(String),
    #[error("invalid column number: {0}")]
    InvalidColumnNumber(String),
}

impl Default for LexErrorKind {
    #[inline]
    fn default() -> Self {
        LexErrorKind::InvalidToken
    }
}

/// `U+0067 'g'`, or just `U+000A` for characters that do not print.
pub fn quote_rune(c: char) -> String {
    if c.is_control() || (c.is_whitespace() && c != ' ') {
        format!("U+{:04X}", c as u32)
    } else {
        format!("U+{:04X} '{c}'", c as u32)
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Lex,
    Parse,
}

/// One reported problem, already resolved to a source position.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}{message}", position_prefix(.pos))]
pub struct Diag {
    pub kind: DiagKind,
    pub pos: Position,
    pub message: String,
}

fn position_prefix(pos: &Position) -> String {
    if !pos.filename.is_empty() || pos.is_valid() {
        format!("{pos}: ")
    } else {
        String::new()
    }
}

impl Diag {
    pub fn lex(pos: Position, kind: &LexErrorKind) -> Self {
        Self {
            kind: DiagKind::Lex,
            pos,
            message: kind.to_string(),
        }
    }

    pub fn parse(pos: Position, message: impl Into<String>) -> Self {
        Self {
            kind: DiagKind::Parse,
            pos,
            message: message.into(),
        }
    }
}

/// Ordered collection of diagnostics for one file.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("{}", summarize(.0))]
pub struct ErrorList(Vec<Diag>);

fn summarize(list: &[Diag]) -> String {
    match list {
        [] => "no errors".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more errors)", rest.len()),
    }
}

impl ErrorList {
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn push(&mut self, d: Diag) {
        self.0.push(d);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Diag> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diag> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Diag] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Diag> {
        self.0
    }

    /// Orders by filename, line, column, then message.
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| {
            (&a.pos.filename, a.pos.line, a.pos.column, &a.message).cmp(&(
                &b.pos.filename,
                b.pos.line,
                b.pos.column,
                &b.message,
            ))
        });
    }

    /// `Ok(())` when empty.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Extend<Diag> for ErrorList {
    fn extend<I: IntoIterator<Item = Diag>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ErrorList {
    type Item = Diag;
    type IntoIter = std::vec::IntoIter<Diag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Diag;
    type IntoIter = std::slice::Iter<'a, Diag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Printer / facade errors
// =============================================================================

/// The printer was handed a tree the parser never produces on success.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrintError {
    #[error("internal error: bad {what} node at offset {offset}")]
    BadNode { what: &'static str, offset: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error(transparent)]
    Syntax(#[from] ErrorList),
    #[error(transparent)]
    Print(#[from] PrintError),
}

impl FormatError {
    /// Diagnostics of a syntax failure; empty for printer failures.
    pub fn diags(&self) -> &[Diag] {
        match self {
            FormatError::Syntax(list) => list.as_slice(),
            FormatError::Print(_) => &[],
        }
    }
}

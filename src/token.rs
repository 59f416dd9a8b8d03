//! Token kinds of the `.api` language.
//!
//! Kinds are laid out so that literal and operator kinds each occupy one
//! contiguous discriminant range; classification is a range check.

use std::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Illegal,
    Eof,
    Comment,

    // literals
    Ident,
    String,

    // operators
    Mul,
    Assign,
    LParen,
    LBrack,
    LBrace,
    Comma,
    RParen,
    RBrack,
    RBrace,
    Semicolon,
    Colon,
    Tilde,
}

const LITERAL_FIRST: u8 = Token::Ident as u8;
const LITERAL_LAST: u8 = Token::String as u8;
const OPERATOR_FIRST: u8 = Token::Mul as u8;
const OPERATOR_LAST: u8 = Token::Tilde as u8;

impl Token {
    /// IDENT or STRING.
    #[inline]
    pub const fn is_literal(self) -> bool {
        let t = self as u8;
        t >= LITERAL_FIRST && t <= LITERAL_LAST
    }

    /// Punctuation.
    #[inline]
    pub const fn is_operator(self) -> bool {
        let t = self as u8;
        t >= OPERATOR_FIRST && t <= OPERATOR_LAST
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Token::Illegal => "ILLEGAL",
            Token::Eof => "EOF",
            Token::Comment => "COMMENT",
            Token::Ident => "IDENT",
            Token::String => "STRING",
            Token::Mul => "*",
            Token::Assign => "=",
            Token::LParen => "(",
            Token::LBrack => "[",
            Token::LBrace => "{",
            Token::Comma => ",",
            Token::RParen => ")",
            Token::RBrack => "]",
            Token::RBrace => "}",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Tilde => "~",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Keywords
// =============================================================================

/// Words with grammatical meaning. They are scanned as plain IDENTs and
/// recognized by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Syntax,
    Import,
    Info,
    Type,
    Struct,
    Map,
    Service,
    ServerExt,
    Doc,
    Handler,
    Returns,
}

impl Keyword {
    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::Syntax => "syntax",
            Keyword::Import => "import",
            Keyword::Info => "info",
            Keyword::Type => "type",
            Keyword::Struct => "struct",
            Keyword::Map => "map",
            Keyword::Service => "service",
            Keyword::ServerExt => "@server",
            Keyword::Doc => "@doc",
            Keyword::Handler => "@handler",
            Keyword::Returns => "returns",
        }
    }

    #[inline]
    pub fn is(self, lit: &str) -> bool {
        self.as_str() == lit
    }

    /// Keywords that open a top-level section; parser recovery stops here.
    pub fn starts_section(lit: &str) -> bool {
        [
            Keyword::Import,
            Keyword::Type,
            Keyword::Info,
            Keyword::Service,
            Keyword::ServerExt,
        ]
        .iter()
        .any(|k| k.is(lit))
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter or `_` first, then letters, digits and `_`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || unicode_ident::is_xid_start(c) => {}
        _ => return false,
    }
    chars.all(unicode_ident::is_xid_continue)
}

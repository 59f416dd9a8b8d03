//! `.api` service definition formatter (logos scanner + hand-written parser).
//!
//! - The scanner uses logos and inserts statement terminators at line ends.
//! - The parser is recursive descent with bounded error recovery.
//! - The printer rebuilds all whitespace from the syntax tree.
//!
//! [`format`] runs the whole pipeline on one file.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod position;
pub mod printer;
pub mod token;

// Re-exports for convenience
pub use error::{Diag, DiagKind, ErrorList, FormatError, PrintError};
pub use lexer::{ScanMode, Scanner, SourceText};
pub use parser::{parse_file, Mode};
pub use printer::{Config, Indent};

/// Formats `src` with the default layout.
///
/// `filename` only labels diagnostics. On lexical or syntax errors nothing
/// is printed and every error is returned.
pub fn format(src: &[u8], filename: &str) -> Result<Vec<u8>, FormatError> {
    format_with(src, filename, &Config::default())
}

pub fn format_with(src: &[u8], filename: &str, config: &Config) -> Result<Vec<u8>, FormatError> {
    let (file, errors) = parse_file(filename, src, Mode::default());
    errors.into_result()?;
    let out = printer::print_file(&file, config)?;
    tracing::debug!(target: "apifmt", filename, bytes = out.len(), "formatted");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::format;

    #[test]
    fn smoke_format_syntax() {
        let out = format(b"syntax   =   \"v1\"", "a.api");
        assert_eq!(out.as_deref().ok(), Some(&b"syntax = \"v1\"\n"[..]));
    }

    #[test]
    fn smoke_reports_errors() {
        let err = format(b"type 9 {}", "a.api").err();
        let msg = err.map(|e| e.to_string()).unwrap_or_default();
        assert_eq!(msg, "a.api:1:6: invalid identifier 9");
    }
}

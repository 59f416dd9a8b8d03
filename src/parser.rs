//! Recursive-descent parser for `.api` files.
//!
//! One token of lookahead. Errors never abort a production: a mismatch is
//! recorded and the parser either assumes the missing token or skips ahead
//! to the next section keyword. Once more than ten errors are on record the
//! whole parse is abandoned and an empty [`File`] is returned.

use std::borrow::Cow;

use crate::ast::{
    ArrayType, Arena, BadDecl, BadExpr, BasicLit, Comment, CommentGroup, CommentGroupId, Decl,
    Expr, Field, FieldList, File, GenDecl, Ident, ImportSpec, InfoDecl, KeyValueExpr, MapType,
    ParenExpr, Route, ServiceApiDecl, ServiceDecl, ServiceExtDecl, ServiceRouteDecl, Spec,
    StarExpr, StructType, SyntaxDecl, TypeSpec,
};
use crate::error::{Diag, ErrorList};
use crate::lexer::{ScanMode, Scanner, SourceText};
use crate::position::{Pos, SourceFile};
use crate::token::{is_identifier, Keyword, Token};

use smallvec::SmallVec;

/// Errors past this count abandon the parse.
const MAX_ERRORS: usize = 10;

/// Parser switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// Keep comments and attach lead/line comment groups to nodes.
    pub comments: bool,
    /// Emit a `tracing` span per production and an event per token.
    pub trace: bool,
    /// Report every error instead of one per line.
    pub all_errors: bool,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            comments: true,
            trace: false,
            all_errors: false,
        }
    }
}

/// Parses one `.api` source.
///
/// The tree is usable only when the returned list is empty; after too many
/// errors it is empty. Errors are sorted by position.
pub fn parse_file(filename: &str, src: &[u8], mode: Mode) -> (File, ErrorList) {
    let text = SourceText::new(src);
    let mut source = SourceFile::new(filename, src.len());

    let mut p = Parser::new(&mut source, &text, mode);
    let file = p.parse_file().unwrap_or_default();
    let mut errors = p.errors;
    errors.sort();

    tracing::debug!(
        target: "apifmt::parser",
        filename,
        decls = file.decls.len(),
        errors = errors.len(),
        "parsed"
    );
    (file, errors)
}

// =============================================================================
// Parser state
// =============================================================================

/// Raised once the error budget is spent; unwinds to [`parse_file`].
#[derive(Debug)]
struct Bailout;

type PResult<T> = Result<T, Bailout>;

struct Parser<'a> {
    scanner: Scanner<'a>,
    mode: Mode,
    errors: ErrorList,
    comments: Arena<CommentGroup>,

    lead_comment: Option<CommentGroupId>,
    line_comment: Option<CommentGroupId>,

    /// Set once the first token has been read.
    started: bool,
    pos: Pos,
    tok: Token,
    lit: Cow<'a, str>,
}

impl<'a> Parser<'a> {
    fn new(file: &'a mut SourceFile, text: &'a SourceText<'_>, mode: Mode) -> Self {
        let scan_mode = ScanMode {
            comments: mode.comments,
            insert_semis: true,
        };
        let mut p = Self {
            scanner: Scanner::new(file, text, scan_mode),
            mode,
            errors: ErrorList::new(),
            comments: Arena::default(),
            lead_comment: None,
            line_comment: None,
            started: false,
            pos: Pos::default(),
            tok: Token::Illegal,
            lit: Cow::Borrowed(""),
        };
        p.next();
        p
    }

    #[inline]
    fn file(&self) -> &SourceFile {
        self.scanner.file()
    }

    #[inline]
    fn line(&self, pos: Pos) -> usize {
        self.file().line(pos)
    }

    fn trace(&self, production: &'static str) -> Option<tracing::span::EnteredSpan> {
        self.mode
            .trace
            .then(|| tracing::trace_span!(target: "apifmt::parser", "parse", production).entered())
    }

    #[inline]
    fn at_keyword(&self, kw: Keyword) -> bool {
        self.tok == Token::Ident && kw.is(&self.lit)
    }

    // -------------------------------------------------------------------------
    // Token stream
    // -------------------------------------------------------------------------

    fn next0(&mut self) {
        if self.mode.trace && self.started {
            tracing::trace!(
                target: "apifmt::parser",
                offset = self.pos.offset(),
                tok = %self.tok,
                lit = %self.lit,
                "consume"
            );
        }
        let (pos, tok, lit) = self.scanner.next_token();
        self.pos = pos;
        self.tok = tok;
        self.lit = lit;
        // Lexical errors go straight in, without per-line filtering.
        self.errors.extend(self.scanner.take_diags());
    }

    /// Advances to the next non-comment token, collecting comment groups and
    /// noting which of them are line or lead comments.
    fn next(&mut self) {
        self.lead_comment = None;
        self.line_comment = None;
        let prev = self.started.then_some(self.pos);
        self.next0();
        self.started = true;

        if self.tok != Token::Comment {
            return;
        }

        let mut comment = None;
        if prev.is_some_and(|prev| self.line(self.pos) == self.line(prev)) {
            // Same line as the previous token: a line comment if nothing
            // else follows on this line.
            let (group, endline) = self.consume_comment_group(0);
            if self.line(self.pos) != endline || self.tok == Token::Eof {
                self.line_comment = Some(group);
            }
            comment = Some(group);
        }

        let mut endline = None;
        while self.tok == Token::Comment {
            let (group, end) = self.consume_comment_group(1);
            comment = Some(group);
            endline = Some(end);
        }

        if let Some(end) = endline {
            if end + 1 == self.line(self.pos) {
                self.lead_comment = comment;
            }
        }
    }

    fn consume_comment(&mut self) -> (Comment, usize) {
        let mut endline = self.line(self.pos);
        if self.lit.as_bytes().get(1) == Some(&b'*') {
            endline += memchr::memchr_iter(b'\n', self.lit.as_bytes()).count();
        }
        let comment = Comment {
            slash: self.pos,
            text: self.lit.clone().into_owned(),
        };
        self.next0();
        (comment, endline)
    }

    /// Comments no more than `n` lines apart form one group.
    fn consume_comment_group(&mut self, n: usize) -> (CommentGroupId, usize) {
        let mut list = Vec::new();
        let mut endline = self.line(self.pos);
        while self.tok == Token::Comment && self.line(self.pos) <= endline + n {
            let (comment, end) = self.consume_comment();
            list.push(comment);
            endline = end;
        }
        (self.comments.alloc(CommentGroup { list }), endline)
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    fn error(&mut self, pos: Pos, msg: impl Into<String>) -> PResult<()> {
        let epos = self.file().position(pos);
        if !self.mode.all_errors {
            let n = self.errors.len();
            if self.errors.last().is_some_and(|d| d.pos.line == epos.line) {
                return Ok(());
            }
            if n > MAX_ERRORS {
                return Err(Bailout);
            }
        }
        self.errors.push(Diag::parse(epos, msg));
        Ok(())
    }

    fn error_expected(&mut self, pos: Pos, what: &str) -> PResult<()> {
        let mut msg = format!("expected {what}");
        if pos == self.pos {
            if self.tok == Token::Semicolon && self.lit == "\n" {
                msg.push_str(", found newline");
            } else if self.tok.is_literal() {
                msg.push_str(", found ");
                msg.push_str(&self.lit);
            } else {
                msg.push_str(&format!(", found '{}'", self.tok));
            }
        }
        self.error(pos, msg)
    }

    /// Consumes one token whether or not it is `tok`.
    fn expect(&mut self, tok: Token) -> PResult<Pos> {
        let pos = self.pos;
        if self.tok != tok {
            self.error_expected(pos, &format!("'{tok}'"))?;
        }
        self.next();
        Ok(pos)
    }

    fn expect_semi(&mut self) -> PResult<()> {
        match self.tok {
            // `)` and `}` close the statement themselves.
            Token::RParen | Token::RBrace => {}
            Token::Semicolon => self.next(),
            Token::Comma => {
                self.error_expected(self.pos, "\";\"")?;
                self.next();
            }
            _ => {
                self.error_expected(self.pos, "\";\"")?;
                self.advance();
            }
        }
        Ok(())
    }

    /// Skips to the next section keyword or EOF.
    fn advance(&mut self) {
        while self.tok != Token::Eof {
            if self.tok == Token::Ident && Keyword::starts_section(&self.lit) {
                return;
            }
            self.next();
        }
    }

    // =========================================================================
    // File
    // =========================================================================

    fn parse_file(&mut self) -> PResult<File> {
        let _t = self.trace("File");

        // Nothing sensible can be built on a broken first token.
        if !self.errors.is_empty() {
            return Ok(File::default());
        }

        let doc = self.lead_comment;
        let syntax = if self.at_keyword(Keyword::Syntax) {
            Some(self.parse_syntax_decl()?)
        } else {
            None
        };

        let mut imports = Vec::new();
        let mut info: Option<InfoDecl> = None;
        loop {
            if self.at_keyword(Keyword::Import) {
                imports.push(self.parse_gen_decl(Keyword::Import)?);
            } else if self.at_keyword(Keyword::Info) {
                let pos = self.pos;
                let decl = self.parse_info_decl()?;
                if info.is_some() {
                    self.error(pos, "duplicate info declaration")?;
                } else {
                    info = Some(decl);
                }
            } else {
                break;
            }
        }

        let mut decls = Vec::new();
        while self.tok != Token::Eof {
            decls.push(self.parse_decl()?);
        }

        Ok(File {
            doc,
            syntax,
            imports,
            info,
            decls,
            comments: std::mem::take(&mut self.comments),
        })
    }

    fn parse_syntax_decl(&mut self) -> PResult<SyntaxDecl> {
        let _t = self.trace("SyntaxDecl");

        let tok_pos = self.expect(Token::Ident)?;
        let assign = self.expect(Token::Assign)?;
        let syntax_name = self.literal();
        self.expect(Token::String)?;
        self.expect_semi()?;

        Ok(SyntaxDecl {
            tok_pos,
            assign,
            syntax_name,
            comment: self.line_comment,
        })
    }

    fn parse_info_decl(&mut self) -> PResult<InfoDecl> {
        let _t = self.trace("InfoDecl");

        let doc = self.lead_comment;
        let tok_pos = self.expect(Token::Ident)?;
        let lparen = self.expect(Token::LParen)?;
        let opening = self.line_comment;
        let elements = self.parse_element_list()?;
        let rparen = self.expect(Token::RParen)?;
        self.expect_semi()?;

        Ok(InfoDecl {
            doc,
            tok_pos,
            lparen,
            opening,
            elements,
            rparen,
            comment: self.line_comment,
        })
    }

    fn parse_element_list(&mut self) -> PResult<Vec<KeyValueExpr>> {
        let _t = self.trace("ElementList");

        let mut kvs = Vec::new();
        while self.tok != Token::RParen && self.tok != Token::Eof {
            let mut kv = self.parse_element(true)?;
            self.expect_semi()?;
            kv.comment = self.line_comment;
            kvs.push(kv);
        }
        Ok(kvs)
    }

    /// `key: value`, or `key value` for route annotations.
    fn parse_element(&mut self, expect_colon: bool) -> PResult<KeyValueExpr> {
        let _t = self.trace("Element");

        let doc = self.lead_comment;
        let key = self.parse_ident(false)?;
        let colon = if expect_colon {
            Some(self.expect(Token::Colon)?)
        } else {
            None
        };

        let value = self.literal();
        if self.tok.is_literal() {
            self.next();
        } else {
            // Left in place: it may well be the `)` closing the block.
            self.error_expected(self.pos, "literal value")?;
        }

        Ok(KeyValueExpr {
            doc,
            key,
            colon,
            value,
            comment: None,
        })
    }

    /// The current token as a literal node, without consuming it.
    fn literal(&self) -> BasicLit {
        BasicLit {
            value_pos: self.pos,
            kind: self.tok,
            value: if self.tok.is_literal() {
                self.lit.clone().into_owned()
            } else {
                String::new()
            },
        }
    }

    /// An identifier; a missing one is recorded as `_`. With `checked`, the
    /// name must also be a well-formed identifier.
    fn parse_ident(&mut self, checked: bool) -> PResult<Ident> {
        let _t = self.trace("Ident");

        let name_pos = self.pos;
        let name = if self.tok == Token::Ident {
            let name = self.lit.clone().into_owned();
            self.next();
            if checked && !is_identifier(&name) {
                self.error(name_pos, format!("invalid identifier {name}"))?;
            }
            name
        } else {
            self.expect(Token::Ident)?;
            "_".to_string()
        };

        Ok(Ident { name_pos, name })
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_decl(&mut self) -> PResult<Decl> {
        let _t = self.trace("Decl");

        if self.at_keyword(Keyword::Type) {
            return Ok(Decl::Gen(self.parse_gen_decl(Keyword::Type)?));
        }
        if self.at_keyword(Keyword::Service) || self.at_keyword(Keyword::ServerExt) {
            return self.parse_service();
        }

        let from = self.pos;
        self.error_expected(from, "declaration")?;
        // Step over the offending token first: it may itself be a section
        // keyword that is not allowed here.
        self.next();
        self.advance();
        Ok(Decl::Bad(BadDecl { from, to: self.pos }))
    }

    /// `import`/`type`, either a single spec or a parenthesized group.
    fn parse_gen_decl(&mut self, keyword: Keyword) -> PResult<GenDecl> {
        let _t = self.trace(match keyword {
            Keyword::Import => "GenDecl(import)",
            _ => "GenDecl(type)",
        });

        let doc = self.lead_comment;
        let tok_pos = self.expect(Token::Ident)?;

        let mut decl = GenDecl {
            doc,
            tok_pos,
            keyword,
            lparen: None,
            opening: None,
            specs: Vec::new(),
            rparen: None,
            comment: None,
        };

        if self.tok == Token::LParen {
            decl.lparen = Some(self.pos);
            self.next();
            decl.opening = self.line_comment;
            while self.tok != Token::RParen && self.tok != Token::Eof {
                let doc = self.lead_comment;
                decl.specs.push(self.parse_spec(keyword, doc)?);
            }
            decl.rparen = Some(self.expect(Token::RParen)?);
            self.expect_semi()?;
            decl.comment = self.line_comment;
        } else {
            decl.specs.push(self.parse_spec(keyword, None)?);
        }

        Ok(decl)
    }

    fn parse_spec(&mut self, keyword: Keyword, doc: Option<CommentGroupId>) -> PResult<Spec> {
        match keyword {
            Keyword::Import => self.parse_import_spec(doc).map(Spec::Import),
            _ => self.parse_type_spec(doc).map(Spec::Type),
        }
    }

    fn parse_import_spec(&mut self, doc: Option<CommentGroupId>) -> PResult<ImportSpec> {
        let _t = self.trace("ImportSpec");

        let path = self.literal();
        self.expect(Token::String)?;
        self.expect_semi()?;

        Ok(ImportSpec {
            doc,
            path,
            comment: self.line_comment,
        })
    }

    fn parse_type_spec(&mut self, doc: Option<CommentGroupId>) -> PResult<TypeSpec> {
        let _t = self.trace("TypeSpec");

        let name = self.parse_ident(true)?;
        let ty = self.parse_struct_type()?;
        self.expect_semi()?;

        Ok(TypeSpec {
            doc,
            name,
            ty,
            comment: self.line_comment,
        })
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn parse_struct_type(&mut self) -> PResult<StructType> {
        let _t = self.trace("StructType");

        let mut struct_pos = None;
        let mut lbrace = None;
        if self.at_keyword(Keyword::Struct) {
            struct_pos = Some(self.expect(Token::Ident)?);
            lbrace = Some(self.expect(Token::LBrace)?);
        } else if self.tok == Token::LBrace {
            lbrace = Some(self.expect(Token::LBrace)?);
        }
        let opening = lbrace.and(self.line_comment);

        let mut list = Vec::new();
        while matches!(
            self.tok,
            Token::Ident | Token::Mul | Token::LParen | Token::LBrack
        ) {
            list.push(self.parse_field_decl()?);
        }
        let rbrace = self.expect(Token::RBrace)?;

        Ok(StructType {
            struct_pos,
            fields: FieldList {
                lbrace,
                opening,
                list,
                rbrace,
            },
        })
    }

    fn parse_field_decl(&mut self) -> PResult<Field> {
        let _t = self.trace("FieldDecl");

        let doc = self.lead_comment;
        let mut names = SmallVec::new();

        let starts_type = self.at_keyword(Keyword::Map) || self.at_keyword(Keyword::Struct);
        let ty = if self.tok == Token::Ident && !starts_type {
            let name = self.parse_ident(true)?;
            if matches!(self.tok, Token::String | Token::Semicolon | Token::RBrace) {
                // embedded
                Expr::Ident(name)
            } else {
                names.push(name);
                while self.tok == Token::Comma {
                    self.next();
                    names.push(self.parse_ident(true)?);
                }
                self.parse_type()?
            }
        } else {
            self.parse_type()?
        };

        let tag = if self.tok == Token::String {
            let tag = self.literal();
            self.next();
            Some(tag)
        } else {
            None
        };
        self.expect_semi()?;

        Ok(Field {
            doc,
            names,
            ty,
            tag,
            comment: self.line_comment,
        })
    }

    fn parse_type(&mut self) -> PResult<Expr> {
        let _t = self.trace("Type");

        if let Some(ty) = self.try_ident_or_type()? {
            return Ok(ty);
        }
        let from = self.pos;
        self.error_expected(from, "type")?;
        self.advance();
        Ok(Expr::Bad(BadExpr { from, to: self.pos }))
    }

    fn try_ident_or_type(&mut self) -> PResult<Option<Expr>> {
        let ty = match self.tok {
            Token::Ident if Keyword::Struct.is(&self.lit) => {
                Expr::Struct(self.parse_struct_type()?)
            }
            Token::Ident if Keyword::Map.is(&self.lit) => Expr::Map(self.parse_map_type()?),
            Token::Ident => Expr::Ident(self.parse_ident(true)?),
            Token::LBrace => Expr::Struct(self.parse_struct_type()?),
            Token::LBrack => Expr::Array(self.parse_array_type()?),
            Token::Mul => Expr::Star(self.parse_pointer_type()?),
            Token::LParen => Expr::Paren(self.parse_paren_expr()?),
            _ => return Ok(None),
        };
        Ok(Some(ty))
    }

    fn parse_map_type(&mut self) -> PResult<MapType> {
        let _t = self.trace("MapType");

        let map = self.expect(Token::Ident)?;
        self.expect(Token::LBrack)?;
        let key = self.parse_type()?;
        self.expect(Token::RBrack)?;
        let value = self.parse_type()?;

        Ok(MapType {
            map,
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    fn parse_array_type(&mut self) -> PResult<ArrayType> {
        let _t = self.trace("ArrayType");

        let lbrack = self.expect(Token::LBrack)?;
        self.expect(Token::RBrack)?;
        let elt = self.parse_type()?;
        Ok(ArrayType {
            lbrack,
            elt: Box::new(elt),
        })
    }

    fn parse_pointer_type(&mut self) -> PResult<StarExpr> {
        let _t = self.trace("PointerType");

        let star = self.expect(Token::Mul)?;
        let x = self.parse_type()?;
        Ok(StarExpr {
            star,
            x: Box::new(x),
        })
    }

    fn parse_paren_expr(&mut self) -> PResult<ParenExpr> {
        let _t = self.trace("ParenExpr");

        let lparen = self.expect(Token::LParen)?;
        let x = self.parse_type()?;
        let rparen = self.expect(Token::RParen)?;
        Ok(ParenExpr {
            lparen,
            x: Box::new(x),
            rparen,
        })
    }

    // =========================================================================
    // Services
    // =========================================================================

    fn parse_service(&mut self) -> PResult<Decl> {
        let _t = self.trace("ServiceDecl");

        let doc = self.lead_comment;
        let ext = if self.at_keyword(Keyword::ServerExt) {
            Some(self.parse_service_ext_decl()?)
        } else {
            None
        };

        if !self.at_keyword(Keyword::Service) {
            let from = self.pos;
            self.error_expected(from, "service")?;
            self.advance();
            return Ok(Decl::Bad(BadDecl { from, to: self.pos }));
        }

        let api = self.parse_service_api_decl()?;
        self.expect_semi()?;

        Ok(Decl::Service(ServiceDecl {
            doc,
            ext,
            api,
            comment: self.line_comment,
        }))
    }

    fn parse_service_ext_decl(&mut self) -> PResult<ServiceExtDecl> {
        let _t = self.trace("ServiceExtDecl");

        let tok_pos = self.expect(Token::Ident)?;
        let lparen = self.expect(Token::LParen)?;
        let opening = self.line_comment;
        let kvs = self.parse_element_list()?;
        let rparen = self.expect(Token::RParen)?;
        self.expect_semi()?;

        Ok(ServiceExtDecl {
            tok_pos,
            lparen,
            opening,
            kvs,
            rparen,
        })
    }

    fn parse_service_api_decl(&mut self) -> PResult<ServiceApiDecl> {
        let _t = self.trace("ServiceApiDecl");

        let tok_pos = self.expect(Token::Ident)?;
        let name = self.parse_ident(false)?;
        let lbrace = self.expect(Token::LBrace)?;
        let opening = self.line_comment;

        let mut routes = Vec::new();
        while self.tok != Token::RBrace && self.tok != Token::Eof {
            routes.push(self.parse_service_route_decl()?);
        }
        let rbrace = self.expect(Token::RBrace)?;

        Ok(ServiceApiDecl {
            tok_pos,
            name,
            lbrace,
            opening,
            routes,
            rbrace,
        })
    }

    fn parse_service_route_decl(&mut self) -> PResult<ServiceRouteDecl> {
        let _t = self.trace("ServiceRouteDecl");

        let doc = self.lead_comment;
        let mut at_doc = None;
        let mut at_handler = None;
        while self.tok == Token::Ident {
            let slot = if Keyword::Doc.is(&self.lit) {
                &mut at_doc
            } else if Keyword::Handler.is(&self.lit) {
                &mut at_handler
            } else {
                break;
            };
            let mut kv = self.parse_element(false)?;
            self.expect_semi()?;
            kv.comment = self.line_comment;
            *slot = Some(kv);
        }

        // Without annotations the lead comment is already `doc`.
        let route_doc = if at_doc.is_some() || at_handler.is_some() {
            self.lead_comment
        } else {
            None
        };
        let route = self.parse_route(route_doc)?;
        Ok(ServiceRouteDecl {
            doc,
            at_doc,
            at_handler,
            route,
            comment: self.line_comment,
        })
    }

    fn parse_route(&mut self, doc: Option<CommentGroupId>) -> PResult<Route> {
        let _t = self.trace("Route");

        let method = self.parse_ident(true)?;
        let path = self.parse_ident(false)?;

        let req = if self.tok == Token::LParen {
            Some(self.parse_paren_expr()?)
        } else {
            None
        };

        let mut returns_pos = None;
        let mut resp = None;
        if self.at_keyword(Keyword::Returns) {
            returns_pos = Some(self.expect(Token::Ident)?);
            resp = Some(self.parse_paren_expr()?);
        }
        self.expect_semi()?;

        Ok(Route {
            doc,
            method,
            path,
            req,
            returns_pos,
            resp,
        })
    }
}

//! Canonical layout for `.api` syntax trees.
//!
//! Printing happens in two passes:
//!
//! 1. The tree is walked into a flat stream of [`Directive`]s: text, tab
//!    stops, line breaks and indentation changes. Comments are merged into
//!    the stream by source position.
//! 2. The stream is rendered. Lines are cut into cells at tab stops and
//!    every column of a block of adjacent lines is padded to its widest
//!    cell, the way an elastic tabwriter does it.
//!
//! Nothing of the original whitespace survives; the output depends on the
//! tree and its comments alone.

use crate::ast::{
    CommentGroup, CommentGroupId, Decl, Expr, Field, FieldList, File, GenDecl, ImportSpec,
    InfoDecl, KeyValueExpr, Node, Route, ServiceDecl, ServiceRouteDecl, Spec, StructType,
    SyntaxDecl, TypeSpec,
};
use crate::error::PrintError;
use crate::position::Pos;
use crate::token::Keyword;

/// Spaces between an aligned cell and the next column.
const PADDING: usize = 1;

// =============================================================================
// Configuration
// =============================================================================

/// Leading whitespace per nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indent {
    #[default]
    Tab,
    Spaces(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub indent: Indent,
}

impl Config {
    fn indent_unit(&self) -> String {
        match self.indent {
            Indent::Tab => "\t".to_string(),
            Indent::Spaces(n) => " ".repeat(n as usize),
        }
    }
}

/// Renders `file` in canonical form.
///
/// Fails only on trees the parser never produces without errors, such as
/// ones holding bad declarations.
pub fn print_file(file: &File, config: &Config) -> Result<Vec<u8>, PrintError> {
    let mut p = Printer::new(file);
    p.file()?;
    let out = render(&p.out, config);
    tracing::debug!(
        target: "apifmt::printer",
        directives = p.out.len(),
        bytes = out.len(),
        "printed"
    );
    Ok(out)
}

// =============================================================================
// Directive stream
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Text(String),
    /// Ends the current cell; the next one starts at an aligned column.
    Tab,
    /// Ends the current line, producing an empty line if it has no content.
    Newline,
    /// Ends the current line if it has content and closes the alignment
    /// section.
    Formfeed,
    /// Ends the current line if it has content.
    SoftBreak,
    Indent,
    Unindent,
}

/// How a trailing comment is separated from its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sep {
    Blank,
    Tab,
}

struct Printer<'f> {
    file: &'f File,
    groups: Vec<(CommentGroupId, &'f CommentGroup)>,
    printed: Vec<bool>,
    /// First group not yet passed by a flush.
    cursor: usize,
    out: Vec<Directive>,
}

impl<'f> Printer<'f> {
    fn new(file: &'f File) -> Self {
        let groups: Vec<_> = file.comments.iter().collect();
        Self {
            file,
            printed: vec![false; groups.len()],
            groups,
            cursor: 0,
            out: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Primitives
    // -------------------------------------------------------------------------

    #[inline]
    fn text(&mut self, s: impl Into<String>) {
        self.out.push(Directive::Text(s.into()));
    }

    #[inline]
    fn sep(&mut self, sep: Sep) {
        match sep {
            Sep::Blank => self.text(" "),
            Sep::Tab => self.out.push(Directive::Tab),
        }
    }

    #[inline]
    fn newline(&mut self) {
        self.out.push(Directive::Newline);
    }

    /// Starts an empty line after whatever is pending.
    fn blank_line(&mut self) {
        self.out.push(Directive::SoftBreak);
        self.out.push(Directive::Newline);
    }

    /// Opens an indented block after the current line. A comment on the
    /// opener's line stays there.
    fn open_block(&mut self, opener: &str, opening: Option<CommentGroupId>) {
        self.text(opener);
        self.trailing(opening, Sep::Blank);
        self.out.push(Directive::Indent);
        self.out.push(Directive::Formfeed);
    }

    fn close_block(&mut self, close: Pos, closer: &str) {
        self.flush_comments(close, None, true);
        self.out.push(Directive::Unindent);
        self.out.push(Directive::Formfeed);
        self.text(closer);
    }

    /// Blank line between top-level items.
    fn separate(&mut self) {
        if !self.out.is_empty() {
            self.blank_line();
        }
    }

    // -------------------------------------------------------------------------
    // Comments
    // -------------------------------------------------------------------------

    /// Prints every pending comment group that starts before `before`, each
    /// on lines of its own. `doc` is printed right above the next node; any
    /// other group is followed by a blank line unless it closes a block.
    fn flush_comments(&mut self, before: Pos, doc: Option<CommentGroupId>, closing: bool) {
        while let Some(&(id, group)) = self.groups.get(self.cursor) {
            if group.pos() >= before {
                break;
            }
            self.cursor += 1;
            if self.printed[id.to_usize()] {
                continue;
            }
            self.printed[id.to_usize()] = true;

            self.out.push(Directive::SoftBreak);
            for c in &group.list {
                self.text(c.text.as_str());
                self.newline();
            }
            if Some(id) != doc && !closing {
                self.newline();
            }
        }
    }

    /// Whether an unprinted comment group starts before `pos`.
    fn has_comments_before(&self, pos: Pos) -> bool {
        self.groups[self.cursor..]
            .iter()
            .take_while(|(_, g)| g.pos() < pos)
            .any(|(id, _)| !self.printed[id.to_usize()])
    }

    /// Appends a line comment to the current line.
    fn trailing(&mut self, comment: Option<CommentGroupId>, sep: Sep) {
        let Some(id) = comment else { return };
        if self.printed[id.to_usize()] {
            return;
        }
        self.printed[id.to_usize()] = true;

        let text = self.file.comments[id]
            .list
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.sep(sep);
        self.text(text);
    }

    // =========================================================================
    // File
    // =========================================================================

    fn file(&mut self) -> Result<(), PrintError> {
        let file = self.file;

        if let Some(syntax) = &file.syntax {
            self.flush_comments(syntax.pos(), file.doc, false);
            self.syntax(syntax);
        }

        // Imports and info keep their relative source order.
        let mut header: Vec<Header<'f>> = file.imports.iter().map(Header::Import).collect();
        header.extend(file.info.as_ref().map(Header::Info));
        header.sort_by_key(|h| h.pos());
        for item in header {
            self.separate();
            match item {
                Header::Import(d) => self.gen_decl(d)?,
                Header::Info(d) => self.info_decl(d),
            }
        }

        for decl in &file.decls {
            self.separate();
            self.decl(decl)?;
        }

        if self.has_comments_before(Pos::new(usize::MAX)) {
            self.separate();
            self.flush_comments(Pos::new(usize::MAX), None, false);
        }
        Ok(())
    }

    fn syntax(&mut self, d: &SyntaxDecl) {
        self.text(format!("{} = {}", Keyword::Syntax, d.syntax_name.value));
        self.trailing(d.comment, Sep::Blank);
        self.newline();
    }

    fn info_decl(&mut self, d: &InfoDecl) {
        self.flush_comments(d.pos(), d.doc, false);
        self.text(format!("{} (", Keyword::Info));
        self.kv_block(&d.elements, d.opening, d.rparen);
        self.text(")");
        self.trailing(d.comment, Sep::Blank);
        self.newline();
    }

    /// Body of an `info`/`@server` block, one pair per line. The opening
    /// paren is already printed.
    fn kv_block(&mut self, kvs: &[KeyValueExpr], opening: Option<CommentGroupId>, rparen: Pos) {
        if kvs.is_empty() && !self.has_comments_before(rparen) {
            return;
        }
        self.trailing(opening, Sep::Blank);
        self.out.push(Directive::Indent);
        self.out.push(Directive::Formfeed);
        for kv in kvs {
            self.flush_comments(kv.pos(), kv.doc, false);
            self.key_value(kv, Sep::Tab);
            self.newline();
        }
        self.close_block(rparen, "");
    }

    fn key_value(&mut self, kv: &KeyValueExpr, sep: Sep) {
        let colon = if kv.colon.is_some() { ":" } else { "" };
        self.text(format!("{}{colon} {}", kv.key.name, kv.value.value));
        self.trailing(kv.comment, sep);
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn decl(&mut self, decl: &Decl) -> Result<(), PrintError> {
        match decl {
            Decl::Bad(d) => Err(PrintError::BadNode {
                what: "declaration",
                offset: d.pos().offset(),
            }),
            Decl::Gen(d) => self.gen_decl(d),
            Decl::Service(d) => self.service_decl(d),
        }
    }

    fn gen_decl(&mut self, d: &GenDecl) -> Result<(), PrintError> {
        let keyword = d.keyword;
        let close = d.rparen.unwrap_or_else(|| d.end());

        match d.specs.as_slice() {
            [] => {
                self.flush_comments(d.pos(), d.doc, false);
                self.text(format!("{keyword} ("));
                if self.has_comments_before(close) {
                    self.trailing(d.opening, Sep::Blank);
                    self.out.push(Directive::Indent);
                    self.out.push(Directive::Formfeed);
                    self.close_block(close, "");
                }
                self.text(")");
                self.trailing(d.comment, Sep::Blank);
                self.newline();
            }
            [only] => {
                // Comments inside dropped parens move above the keyword.
                self.flush_comments(only.pos(), d.doc.or(only.doc()), false);
                self.text(format!("{keyword} "));
                self.spec(only, Sep::Blank)?;
                self.newline();
            }
            specs => {
                self.flush_comments(d.pos(), d.doc, false);
                self.open_block(&format!("{keyword} ("), d.opening);
                for (i, spec) in specs.iter().enumerate() {
                    if i > 0 && keyword == Keyword::Type {
                        self.blank_line();
                    }
                    self.flush_comments(spec.pos(), spec.doc(), false);
                    let sep = match spec {
                        Spec::Import(_) => Sep::Tab,
                        Spec::Type(_) => Sep::Blank,
                    };
                    self.spec(spec, sep)?;
                    self.newline();
                }
                self.close_block(close, ")");
                self.trailing(d.comment, Sep::Blank);
                self.newline();
            }
        }
        Ok(())
    }

    fn spec(&mut self, spec: &Spec, sep: Sep) -> Result<(), PrintError> {
        match spec {
            Spec::Import(s) => {
                self.import_spec(s, sep);
                Ok(())
            }
            Spec::Type(s) => self.type_spec(s, sep),
        }
    }

    fn import_spec(&mut self, s: &ImportSpec, sep: Sep) {
        self.text(s.path.value.as_str());
        self.trailing(s.comment, sep);
    }

    fn type_spec(&mut self, s: &TypeSpec, sep: Sep) -> Result<(), PrintError> {
        self.text(format!("{} ", s.name.name));
        self.struct_type(&s.ty)?;
        self.trailing(s.comment, sep);
        Ok(())
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn struct_type(&mut self, s: &StructType) -> Result<(), PrintError> {
        if s.struct_pos.is_some() {
            self.text(format!("{} ", Keyword::Struct));
        }
        self.field_list(&s.fields)
    }

    fn field_list(&mut self, fields: &FieldList) -> Result<(), PrintError> {
        if fields.list.is_empty() && !self.has_comments_before(fields.rbrace) {
            self.text("{}");
            return Ok(());
        }

        self.open_block("{", fields.opening);
        // A lone field needs no alignment.
        let sep = if fields.list.len() == 1 {
            Sep::Blank
        } else {
            Sep::Tab
        };
        for field in &fields.list {
            self.flush_comments(field.pos(), field.doc, false);
            self.field(field, sep)?;
            self.newline();
        }
        self.close_block(fields.rbrace, "}");
        Ok(())
    }

    fn field(&mut self, f: &Field, sep: Sep) -> Result<(), PrintError> {
        // The closing brace of a nested struct does not line up with
        // sibling cells.
        let sep = if has_struct(&f.ty) { Sep::Blank } else { sep };
        if !f.names.is_empty() {
            let names: Vec<&str> = f.names.iter().map(|n| n.name.as_str()).collect();
            self.text(names.join(", "));
            self.sep(sep);
        }
        self.expr(&f.ty)?;
        if let Some(tag) = &f.tag {
            self.sep(sep);
            self.text(tag.value.as_str());
        }

        let pending = f.comment.filter(|id| !self.printed[id.to_usize()]);
        if pending.is_some() && f.tag.is_none() && !f.names.is_empty() && sep == Sep::Tab {
            // empty tag column
            self.sep(sep);
        }
        self.trailing(pending, sep);
        Ok(())
    }

    fn expr(&mut self, e: &Expr) -> Result<(), PrintError> {
        match e {
            Expr::Bad(b) => {
                return Err(PrintError::BadNode {
                    what: "expression",
                    offset: b.pos().offset(),
                })
            }
            Expr::Ident(id) => self.text(id.name.as_str()),
            Expr::Star(s) => {
                self.text("*");
                self.expr(&s.x)?;
            }
            Expr::Array(a) => {
                self.text("[]");
                self.expr(&a.elt)?;
            }
            Expr::Map(m) => {
                self.text(format!("{}[", Keyword::Map));
                self.expr(&m.key)?;
                self.text("]");
                self.expr(&m.value)?;
            }
            Expr::Struct(s) => self.struct_type(s)?,
            Expr::Paren(p) => {
                self.text("(");
                self.expr(&p.x)?;
                self.text(")");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Services
    // =========================================================================

    fn service_decl(&mut self, d: &ServiceDecl) -> Result<(), PrintError> {
        self.flush_comments(d.pos(), d.doc, false);

        if let Some(ext) = &d.ext {
            self.text(format!("{} (", Keyword::ServerExt));
            self.kv_block(&ext.kvs, ext.opening, ext.rparen);
            self.text(")");
            self.newline();
            self.blank_line();
            self.flush_comments(d.api.pos(), None, false);
        }

        let api = &d.api;
        self.text(format!("{} {} ", Keyword::Service, api.name.name));
        if api.routes.is_empty() && !self.has_comments_before(api.rbrace) {
            self.text("{}");
        } else {
            self.open_block("{", api.opening);
            for (i, route) in api.routes.iter().enumerate() {
                if i > 0 {
                    self.blank_line();
                }
                self.flush_comments(route.pos(), route.doc, false);
                self.route_decl(route)?;
            }
            self.close_block(api.rbrace, "}");
        }
        self.trailing(d.comment, Sep::Blank);
        self.newline();
        Ok(())
    }

    fn route_decl(&mut self, r: &ServiceRouteDecl) -> Result<(), PrintError> {
        for kv in [&r.at_doc, &r.at_handler].into_iter().flatten() {
            self.flush_comments(kv.pos(), kv.doc, false);
            self.key_value(kv, Sep::Blank);
            self.newline();
        }
        self.flush_comments(r.route.pos(), r.route.doc, false);
        self.route(&r.route)?;
        self.trailing(r.comment, Sep::Blank);
        self.newline();
        Ok(())
    }

    fn route(&mut self, r: &Route) -> Result<(), PrintError> {
        self.text(format!("{} {}", r.method.name, r.path.name));
        if let Some(req) = &r.req {
            self.text(" ");
            self.expr(&Expr::Paren(req.clone()))?;
        }
        if let Some(resp) = &r.resp {
            self.text(format!(" {} ", Keyword::Returns));
            self.expr(&Expr::Paren(resp.clone()))?;
        }
        Ok(())
    }
}

fn has_struct(e: &Expr) -> bool {
    match e {
        Expr::Struct(_) => true,
        Expr::Star(s) => has_struct(&s.x),
        Expr::Array(a) => has_struct(&a.elt),
        Expr::Map(m) => has_struct(&m.key) || has_struct(&m.value),
        Expr::Paren(p) => has_struct(&p.x),
        Expr::Bad(_) | Expr::Ident(_) => false,
    }
}

#[derive(Clone, Copy)]
enum Header<'f> {
    Import(&'f GenDecl),
    Info(&'f InfoDecl),
}

impl Header<'_> {
    fn pos(&self) -> Pos {
        match self {
            Header::Import(d) => d.pos(),
            Header::Info(d) => d.pos(),
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

#[derive(Debug, Default)]
struct Line {
    indent: usize,
    cells: Vec<String>,
    section: usize,
    /// Continuation of a multi-line literal or comment, written as is.
    verbatim: bool,
    /// Ends inside a multi-line literal; trailing blanks are content.
    open: bool,
}

impl Line {
    fn has_content(&self) -> bool {
        self.cells.len() > 1 || self.cells.first().is_some_and(|c| !c.is_empty())
    }

    /// Cells followed by a tab stop.
    fn terminated(&self) -> usize {
        if self.verbatim {
            0
        } else {
            self.cells.len().saturating_sub(1)
        }
    }
}

struct LineBuilder {
    lines: Vec<Line>,
    cur: Line,
    started: bool,
    depth: usize,
    section: usize,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            cur: Self::fresh(false, 0),
            started: false,
            depth: 0,
            section: 0,
        }
    }

    fn fresh(verbatim: bool, section: usize) -> Line {
        Line {
            cells: vec![String::new()],
            section,
            verbatim,
            ..Line::default()
        }
    }

    /// Pins the line's indentation at its first content.
    fn touch(&mut self) {
        if !self.started {
            self.cur.indent = self.depth;
            self.started = true;
        }
    }

    fn push_str(&mut self, s: &str) {
        self.touch();
        if let Some(cell) = self.cur.cells.last_mut() {
            cell.push_str(s);
        }
    }

    fn finish(&mut self, verbatim_next: bool) {
        if !self.started {
            self.cur.indent = self.depth;
        }
        let next = Self::fresh(verbatim_next, self.section);
        self.lines.push(std::mem::replace(&mut self.cur, next));
        self.started = verbatim_next;
    }

    fn apply(&mut self, d: &Directive) {
        match d {
            Directive::Text(s) => {
                let mut parts = s.split('\n');
                if let Some(first) = parts.next() {
                    self.push_str(first);
                }
                for part in parts {
                    self.cur.open = true;
                    self.finish(true);
                    self.push_str(part);
                }
            }
            Directive::Tab => {
                self.touch();
                self.cur.cells.push(String::new());
            }
            Directive::Newline => self.finish(false),
            Directive::Formfeed => {
                if self.cur.has_content() {
                    self.finish(false);
                }
                self.section += 1;
                self.cur.section = self.section;
            }
            Directive::SoftBreak => {
                if self.cur.has_content() {
                    self.finish(false);
                }
            }
            Directive::Indent => self.depth += 1,
            Directive::Unindent => self.depth = self.depth.saturating_sub(1),
        }
    }

    fn into_lines(mut self) -> Vec<Line> {
        if self.cur.has_content() {
            self.finish(false);
        }
        self.lines
    }
}

fn render(directives: &[Directive], config: &Config) -> Vec<u8> {
    let mut builder = LineBuilder::new();
    for d in directives {
        builder.apply(d);
    }
    let lines = builder.into_lines();

    let mut widths: Vec<Vec<usize>> = lines.iter().map(|l| vec![0; l.terminated()]).collect();
    let mut start = 0;
    while start < lines.len() {
        let head = &lines[start];
        let run = lines[start..]
            .iter()
            .take_while(|l| !l.verbatim && l.indent == head.indent && l.section == head.section)
            .count()
            .max(1);
        align(&lines[start..start + run], &mut widths[start..start + run], 0);
        start += run;
    }

    write_lines(&lines, &widths, &config.indent_unit())
}

/// Sizes column `col` of every block of adjacent lines that has it, then
/// recurses into the block for the columns further right.
fn align(lines: &[Line], widths: &mut [Vec<usize>], col: usize) {
    let mut i = 0;
    while i < lines.len() {
        if lines[i].terminated() <= col {
            i += 1;
            continue;
        }

        let start = i;
        let mut width = 0;
        let mut all_empty = true;
        while i < lines.len() && lines[i].terminated() > col {
            let cell = &lines[i].cells[col];
            width = width.max(cell.chars().count() + PADDING);
            all_empty &= cell.is_empty();
            i += 1;
        }
        // A column with nothing in it takes no room.
        let width = if all_empty { 0 } else { width };
        for w in &mut widths[start..i] {
            w[col] = width;
        }
        align(&lines[start..i], &mut widths[start..i], col + 1);
    }
}

fn write_lines(lines: &[Line], widths: &[Vec<usize>], indent_unit: &str) -> Vec<u8> {
    let mut out = String::new();
    let mut last_blank = true;

    for (line, widths) in lines.iter().zip(widths) {
        if line.verbatim {
            out.push_str(&line.cells.join(" "));
            if !line.open {
                trim_end_blanks(&mut out);
            }
            out.push('\n');
            last_blank = false;
            continue;
        }
        if !line.has_content() {
            if !last_blank {
                out.push('\n');
                last_blank = true;
            }
            continue;
        }

        for _ in 0..line.indent {
            out.push_str(indent_unit);
        }
        let Some((last, terminated)) = line.cells.split_last() else {
            continue;
        };
        for (cell, &width) in terminated.iter().zip(widths) {
            out.push_str(cell);
            let pad = width.saturating_sub(cell.chars().count());
            out.extend(std::iter::repeat(' ').take(pad));
        }
        out.push_str(last);
        if !line.open {
            trim_end_blanks(&mut out);
        }
        out.push('\n');
        last_blank = false;
    }

    while out.ends_with("\n\n") {
        out.pop();
    }
    out.into_bytes()
}

fn trim_end_blanks(out: &mut String) {
    let keep = out.trim_end_matches([' ', '\t']).len();
    out.truncate(keep);
}

//! # `.api` syntax tree
//!
//! Plain data produced by the parser and consumed by the printer.
//!
//! - **Nodes** are owned by their parent; the [`File`] owns everything.
//! - **Comments** live in one append-only pool ([`File::comments`]) in source
//!   order. Nodes refer to their lead (`doc`) and trailing (`comment`) groups
//!   by [`CommentGroupId`]; a group is never owned by a node.
//! - **Positions** are raw byte offsets. Every node implements [`Node`],
//!   deriving its extent from its children and delimiters.

use core::fmt;
use core::marker::PhantomData;
use core::ops::Index;

use smallvec::SmallVec;

use crate::position::{Pos, Span};
use crate::token::{Keyword, Token};

// =============================================================================
// Core Foundation Types
// =============================================================================

/// Type-safe index into an [`Arena`].
#[repr(transparent)]
pub struct Id<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn to_usize(self) -> usize {
        self.raw as usize
    }
}

// Manual impls: derives would demand the same traits of `T`.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> core::hash::Hash for Id<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

/// Append-only storage handing out [`Id`]s.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn alloc(&mut self, value: T) -> Id<T> {
        let id = Id::from_raw(self.items.len() as u32);
        self.items.push(value);
        id
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.to_usize())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, v)| (Id::from_raw(i as u32), v))
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &T {
        &self.items[id.to_usize()]
    }
}

/// Source extent of a node.
pub trait Node {
    /// First byte of the node.
    fn pos(&self) -> Pos;
    /// First byte after the node.
    fn end(&self) -> Pos;

    #[inline]
    fn span(&self) -> Span {
        Span::new(self.pos(), self.end())
    }
}

// =============================================================================
// Comments
// =============================================================================

/// A single `//` or `/* */` comment, markers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub slash: Pos,
    pub text: String,
}

/// Comments with no token and at most one blank line between them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentGroup {
    pub list: Vec<Comment>,
}

pub type CommentGroupId = Id<CommentGroup>;

impl Node for Comment {
    fn pos(&self) -> Pos {
        self.slash
    }
    fn end(&self) -> Pos {
        self.slash.add(self.text.len())
    }
}

impl Node for CommentGroup {
    fn pos(&self) -> Pos {
        self.list.first().map_or_else(Pos::default, Node::pos)
    }
    fn end(&self) -> Pos {
        self.list.last().map_or_else(Pos::default, Node::end)
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name_pos: Pos,
    pub name: String,
}

/// Literal as written, quotes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicLit {
    pub value_pos: Pos,
    pub kind: Token,
    pub value: String,
}

/// `key: value` in `info`/`@server` blocks, or `@doc value` in a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueExpr {
    pub doc: Option<CommentGroupId>,
    pub key: Ident,
    pub colon: Option<Pos>,
    pub value: BasicLit,
    pub comment: Option<CommentGroupId>,
}

/// Placeholder for a type that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadExpr {
    pub from: Pos,
    pub to: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParenExpr {
    pub lparen: Pos,
    pub x: Box<Expr>,
    pub rparen: Pos,
}

/// `*T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarExpr {
    pub star: Pos,
    pub x: Box<Expr>,
}

/// `[]T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    pub lbrack: Pos,
    pub elt: Box<Expr>,
}

/// `map[K]V`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapType {
    pub map: Pos,
    pub key: Box<Expr>,
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub doc: Option<CommentGroupId>,
    /// Empty for an embedded field.
    pub names: SmallVec<[Ident; 1]>,
    pub ty: Expr,
    pub tag: Option<BasicLit>,
    pub comment: Option<CommentGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldList {
    pub lbrace: Option<Pos>,
    /// Line comment right after `{`.
    pub opening: Option<CommentGroupId>,
    pub list: Vec<Field>,
    pub rbrace: Pos,
}

/// `[struct] { fields }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub struct_pos: Option<Pos>,
    pub fields: FieldList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Bad(BadExpr),
    Ident(Ident),
    Star(StarExpr),
    Array(ArrayType),
    Map(MapType),
    Struct(StructType),
    Paren(ParenExpr),
}

impl Node for Ident {
    fn pos(&self) -> Pos {
        self.name_pos
    }
    fn end(&self) -> Pos {
        self.name_pos.add(self.name.len())
    }
}

impl Node for BasicLit {
    fn pos(&self) -> Pos {
        self.value_pos
    }
    fn end(&self) -> Pos {
        self.value_pos.add(self.value.len())
    }
}

impl Node for KeyValueExpr {
    fn pos(&self) -> Pos {
        self.key.pos()
    }
    fn end(&self) -> Pos {
        self.value.end()
    }
}

impl Node for BadExpr {
    fn pos(&self) -> Pos {
        self.from
    }
    fn end(&self) -> Pos {
        self.to
    }
}

impl Node for ParenExpr {
    fn pos(&self) -> Pos {
        self.lparen
    }
    fn end(&self) -> Pos {
        self.rparen.add(1)
    }
}

impl Node for StarExpr {
    fn pos(&self) -> Pos {
        self.star
    }
    fn end(&self) -> Pos {
        self.x.end()
    }
}

impl Node for ArrayType {
    fn pos(&self) -> Pos {
        self.lbrack
    }
    fn end(&self) -> Pos {
        self.elt.end()
    }
}

impl Node for MapType {
    fn pos(&self) -> Pos {
        self.map
    }
    fn end(&self) -> Pos {
        self.value.end()
    }
}

impl Node for Field {
    fn pos(&self) -> Pos {
        self.names.first().map_or_else(|| self.ty.pos(), Node::pos)
    }
    fn end(&self) -> Pos {
        self.tag.as_ref().map_or_else(|| self.ty.end(), Node::end)
    }
}

impl Node for FieldList {
    fn pos(&self) -> Pos {
        self.lbrace
            .or_else(|| self.list.first().map(Node::pos))
            .unwrap_or(self.rbrace)
    }
    fn end(&self) -> Pos {
        self.rbrace.add(1)
    }
}

impl Node for StructType {
    fn pos(&self) -> Pos {
        self.struct_pos.unwrap_or_else(|| self.fields.pos())
    }
    fn end(&self) -> Pos {
        self.fields.end()
    }
}

impl Node for Expr {
    fn pos(&self) -> Pos {
        match self {
            Expr::Bad(x) => x.pos(),
            Expr::Ident(x) => x.pos(),
            Expr::Star(x) => x.pos(),
            Expr::Array(x) => x.pos(),
            Expr::Map(x) => x.pos(),
            Expr::Struct(x) => x.pos(),
            Expr::Paren(x) => x.pos(),
        }
    }
    fn end(&self) -> Pos {
        match self {
            Expr::Bad(x) => x.end(),
            Expr::Ident(x) => x.end(),
            Expr::Star(x) => x.end(),
            Expr::Array(x) => x.end(),
            Expr::Map(x) => x.end(),
            Expr::Struct(x) => x.end(),
            Expr::Paren(x) => x.end(),
        }
    }
}

// =============================================================================
// Specs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub doc: Option<CommentGroupId>,
    pub path: BasicLit,
    pub comment: Option<CommentGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub doc: Option<CommentGroupId>,
    pub name: Ident,
    pub ty: StructType,
    pub comment: Option<CommentGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spec {
    Import(ImportSpec),
    Type(TypeSpec),
}

impl Spec {
    pub fn doc(&self) -> Option<CommentGroupId> {
        match self {
            Spec::Import(s) => s.doc,
            Spec::Type(s) => s.doc,
        }
    }

    pub fn comment(&self) -> Option<CommentGroupId> {
        match self {
            Spec::Import(s) => s.comment,
            Spec::Type(s) => s.comment,
        }
    }
}

impl Node for ImportSpec {
    fn pos(&self) -> Pos {
        self.path.pos()
    }
    fn end(&self) -> Pos {
        self.path.end()
    }
}

impl Node for TypeSpec {
    fn pos(&self) -> Pos {
        self.name.pos()
    }
    fn end(&self) -> Pos {
        self.ty.end()
    }
}

impl Node for Spec {
    fn pos(&self) -> Pos {
        match self {
            Spec::Import(s) => s.pos(),
            Spec::Type(s) => s.pos(),
        }
    }
    fn end(&self) -> Pos {
        match self {
            Spec::Import(s) => s.end(),
            Spec::Type(s) => s.end(),
        }
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// Placeholder for a section that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadDecl {
    pub from: Pos,
    pub to: Pos,
}

/// `syntax = "v1"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxDecl {
    pub tok_pos: Pos,
    pub assign: Pos,
    pub syntax_name: BasicLit,
    pub comment: Option<CommentGroupId>,
}

/// `info ( key: value ... )`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoDecl {
    pub doc: Option<CommentGroupId>,
    pub tok_pos: Pos,
    pub lparen: Pos,
    pub opening: Option<CommentGroupId>,
    pub elements: Vec<KeyValueExpr>,
    pub rparen: Pos,
    pub comment: Option<CommentGroupId>,
}

/// `import ...` or `type ...`, with or without parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenDecl {
    pub doc: Option<CommentGroupId>,
    pub tok_pos: Pos,
    pub keyword: Keyword,
    pub lparen: Option<Pos>,
    pub opening: Option<CommentGroupId>,
    pub specs: Vec<Spec>,
    pub rparen: Option<Pos>,
    pub comment: Option<CommentGroupId>,
}

/// `@server ( key: value ... )`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceExtDecl {
    pub tok_pos: Pos,
    pub lparen: Pos,
    pub opening: Option<CommentGroupId>,
    pub kvs: Vec<KeyValueExpr>,
    pub rparen: Pos,
}

/// `service Name { routes }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceApiDecl {
    pub tok_pos: Pos,
    pub name: Ident,
    pub lbrace: Pos,
    pub opening: Option<CommentGroupId>,
    pub routes: Vec<ServiceRouteDecl>,
    pub rbrace: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDecl {
    pub doc: Option<CommentGroupId>,
    pub ext: Option<ServiceExtDecl>,
    pub api: ServiceApiDecl,
    pub comment: Option<CommentGroupId>,
}

/// Route with its optional `@doc` / `@handler` annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRouteDecl {
    pub doc: Option<CommentGroupId>,
    pub at_doc: Option<KeyValueExpr>,
    pub at_handler: Option<KeyValueExpr>,
    pub route: Route,
    pub comment: Option<CommentGroupId>,
}

/// `method path [(Req)] [returns (Resp)]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Lead comment between the annotations and the method.
    pub doc: Option<CommentGroupId>,
    pub method: Ident,
    pub path: Ident,
    pub req: Option<ParenExpr>,
    pub returns_pos: Option<Pos>,
    pub resp: Option<ParenExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Bad(BadDecl),
    Gen(GenDecl),
    Service(ServiceDecl),
}

impl Decl {
    pub fn doc(&self) -> Option<CommentGroupId> {
        match self {
            Decl::Bad(_) => None,
            Decl::Gen(d) => d.doc,
            Decl::Service(d) => d.doc,
        }
    }
}

impl Node for BadDecl {
    fn pos(&self) -> Pos {
        self.from
    }
    fn end(&self) -> Pos {
        self.to
    }
}

impl Node for SyntaxDecl {
    fn pos(&self) -> Pos {
        self.tok_pos
    }
    fn end(&self) -> Pos {
        self.syntax_name.end()
    }
}

impl Node for InfoDecl {
    fn pos(&self) -> Pos {
        self.tok_pos
    }
    fn end(&self) -> Pos {
        self.rparen.add(1)
    }
}

impl Node for GenDecl {
    fn pos(&self) -> Pos {
        self.tok_pos
    }
    fn end(&self) -> Pos {
        match (self.rparen, self.specs.last()) {
            (Some(rparen), _) => rparen.add(1),
            (None, Some(last)) => last.end(),
            (None, None) => self.tok_pos.add(self.keyword.as_str().len()),
        }
    }
}

impl Node for ServiceExtDecl {
    fn pos(&self) -> Pos {
        self.tok_pos
    }
    fn end(&self) -> Pos {
        self.rparen.add(1)
    }
}

impl Node for ServiceApiDecl {
    fn pos(&self) -> Pos {
        self.tok_pos
    }
    fn end(&self) -> Pos {
        self.rbrace.add(1)
    }
}

impl Node for ServiceDecl {
    fn pos(&self) -> Pos {
        self.ext.as_ref().map_or_else(|| self.api.pos(), Node::pos)
    }
    fn end(&self) -> Pos {
        self.api.end()
    }
}

impl Node for Route {
    fn pos(&self) -> Pos {
        self.method.pos()
    }
    fn end(&self) -> Pos {
        if let Some(resp) = &self.resp {
            resp.end()
        } else if let Some(req) = &self.req {
            req.end()
        } else {
            self.path.end()
        }
    }
}

impl Node for ServiceRouteDecl {
    fn pos(&self) -> Pos {
        [&self.at_doc, &self.at_handler]
            .into_iter()
            .flatten()
            .map(Node::pos)
            .chain([self.route.pos()])
            .min()
            .unwrap_or_else(|| self.route.pos())
    }
    fn end(&self) -> Pos {
        self.route.end()
    }
}

impl Node for Decl {
    fn pos(&self) -> Pos {
        match self {
            Decl::Bad(d) => d.pos(),
            Decl::Gen(d) => d.pos(),
            Decl::Service(d) => d.pos(),
        }
    }
    fn end(&self) -> Pos {
        match self {
            Decl::Bad(d) => d.end(),
            Decl::Gen(d) => d.end(),
            Decl::Service(d) => d.end(),
        }
    }
}

// =============================================================================
// File
// =============================================================================

/// Root of a parsed `.api` file.
#[derive(Debug, Clone, Default)]
pub struct File {
    pub doc: Option<CommentGroupId>,
    pub syntax: Option<SyntaxDecl>,
    pub imports: Vec<GenDecl>,
    pub info: Option<InfoDecl>,
    /// Type declarations and services, in source order.
    pub decls: Vec<Decl>,
    /// Every comment group of the file, in source order.
    pub comments: Arena<CommentGroup>,
}

impl File {
    /// Type specs across all `type` declarations, in source order.
    pub fn type_specs(&self) -> impl Iterator<Item = &TypeSpec> {
        self.decls
            .iter()
            .filter_map(|d| match d {
                Decl::Gen(g) => Some(g.specs.iter()),
                _ => None,
            })
            .flatten()
            .filter_map(|s| match s {
                Spec::Type(t) => Some(t),
                Spec::Import(_) => None,
            })
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Service(s) => Some(s),
            _ => None,
        })
    }

    /// Text of a comment group, one comment per line.
    pub fn comment_text(&self, id: CommentGroupId) -> String {
        self.comments.get(id).map_or_else(String::new, |g| {
            g.list
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

use apifmt::ast::{Decl, Expr, File, Spec, TypeSpec};
use apifmt::{parse_file, Mode};

fn assert_parses(src: &str) -> File {
    let (file, errors) = parse_file("t.api", src.as_bytes(), Mode::default());
    if !errors.is_empty() {
        panic!("expected parse ok, got diagnostics: {:#?}", errors.as_slice());
    }
    file
}

fn type_specs(file: &File) -> Vec<&TypeSpec> {
    file.type_specs().collect()
}

fn text(file: &File, group: Option<apifmt::ast::CommentGroupId>) -> Option<String> {
    group.map(|g| file.comment_text(g))
}

#[test]
fn parses_syntax_declaration() {
    let f = assert_parses("syntax = \"v1\"\n");
    let syntax = f.syntax.expect("syntax decl");
    assert_eq!(syntax.syntax_name.value, "\"v1\"");
    assert!(f.decls.is_empty());
}

#[test]
fn parses_info_block() {
    let f = assert_parses("info(\nauthor: me\nversion: \"1.0\"\n)");
    let info = f.info.expect("info decl");
    let pairs: Vec<_> = info
        .elements
        .iter()
        .map(|kv| (kv.key.name.as_str(), kv.value.value.as_str()))
        .collect();
    assert_eq!(pairs, [("author", "me"), ("version", "\"1.0\"")]);
}

#[test]
fn parses_struct_with_tag() {
    let f = assert_parses("type User struct { Name string `json:\"name\"` }");
    let specs = type_specs(&f);
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name.name, "User");
    assert!(specs[0].ty.struct_pos.is_some());

    let field = &specs[0].ty.fields.list[0];
    assert_eq!(field.names[0].name, "Name");
    assert!(matches!(&field.ty, Expr::Ident(id) if id.name == "string"));
    assert_eq!(field.tag.as_ref().map(|t| t.value.as_str()), Some("`json:\"name\"`"));
}

#[test]
fn parses_field_types() {
    let f = assert_parses(
        r#"
type T {
    A, B int
    Embedded
    *Ptr
    List []*Item
    Lookup map[string][]int
    Inner {
        X bool
    } `json:"inner"`
    Anon struct {}
}
"#,
    );
    let fields = &type_specs(&f)[0].ty.fields.list;
    assert_eq!(fields.len(), 7);
    assert_eq!(fields[0].names.len(), 2);
    assert!(fields[1].names.is_empty() && matches!(fields[1].ty, Expr::Ident(_)));
    assert!(fields[2].names.is_empty() && matches!(fields[2].ty, Expr::Star(_)));
    assert!(matches!(&fields[3].ty, Expr::Array(a) if matches!(*a.elt, Expr::Star(_))));
    assert!(matches!(&fields[4].ty, Expr::Map(m) if matches!(*m.value, Expr::Array(_))));
    assert!(matches!(&fields[5].ty, Expr::Struct(s) if s.fields.list.len() == 1));
    assert!(fields[5].tag.is_some());
    assert!(matches!(&fields[6].ty, Expr::Struct(s) if s.struct_pos.is_some()));
}

#[test]
fn parses_service_route() {
    let f = assert_parses("service Foo { post /ping returns (Pong) }");
    let svc = f.services().next().expect("service");
    assert_eq!(svc.api.name.name, "Foo");
    assert!(svc.ext.is_none());

    let route = &svc.api.routes[0].route;
    assert_eq!(route.method.name, "post");
    assert_eq!(route.path.name, "/ping");
    assert!(route.req.is_none());
    assert!(route.returns_pos.is_some());
    assert!(matches!(route.resp.as_ref().map(|p| &*p.x), Some(Expr::Ident(id)) if id.name == "Pong"));
}

#[test]
fn parses_server_annotations() {
    let f = assert_parses(
        r#"
@server(
    group: user
    prefix: /v1
)
service user-api {
    @doc "get user"
    @handler getUser
    get /users/:id (Req) returns (Resp)

    @handler ping
    get /ping
}
"#,
    );
    let svc = f.services().next().expect("service");
    let ext = svc.ext.as_ref().expect("@server block");
    assert_eq!(ext.kvs[1].value.value, "/v1");
    assert_eq!(svc.api.name.name, "user-api");

    let routes = &svc.api.routes;
    assert_eq!(routes.len(), 2);
    assert_eq!(
        routes[0].at_doc.as_ref().map(|kv| kv.value.value.as_str()),
        Some("\"get user\"")
    );
    assert_eq!(
        routes[0].at_handler.as_ref().map(|kv| kv.value.value.as_str()),
        Some("getUser")
    );
    assert_eq!(routes[0].route.path.name, "/users/:id");
    assert!(routes[1].at_doc.is_none());
}

#[test]
fn parses_import_group() {
    let f = assert_parses("import (\n\"a.api\"\n\"b.api\"\n)\nimport \"c.api\"\n");
    assert_eq!(f.imports.len(), 2);
    assert!(f.imports[0].lparen.is_some());
    assert_eq!(f.imports[0].specs.len(), 2);
    assert!(f.imports[1].lparen.is_none());
    assert!(matches!(&f.imports[1].specs[0], Spec::Import(s) if s.path.value == "\"c.api\""));
}

#[test]
fn parses_type_group() {
    let f = assert_parses("type (\n\tA {}\n\tB {\n\t\tX int\n\t}\n)\n");
    let Decl::Gen(g) = &f.decls[0] else {
        panic!("expected type group");
    };
    assert_eq!(g.specs.len(), 2);
}

#[test]
fn header_sections_may_interleave() {
    let f = assert_parses("import \"a.api\"\ninfo (\n\tk: v\n)\nimport \"b.api\"\n");
    assert_eq!(f.imports.len(), 2);
    assert!(f.info.is_some());
}

// =============================================================================
// Comments
// =============================================================================

#[test]
fn file_doc_needs_adjacent_syntax() {
    let f = assert_parses("// api file\nsyntax = \"v1\"\n");
    assert_eq!(text(&f, f.doc).as_deref(), Some("// api file"));

    let f = assert_parses("// detached\n\nsyntax = \"v1\"\n");
    assert!(f.doc.is_none());
    assert_eq!(f.comments.len(), 1);
}

#[test]
fn doc_and_trailing_comments() {
    let f = assert_parses(
        "// User is a user.\ntype User {\n\tName string // the name\n\n\t// floating\n\n\tAge int\n}\n",
    );
    let Decl::Gen(g) = &f.decls[0] else {
        panic!("expected type decl");
    };
    assert_eq!(text(&f, g.doc).as_deref(), Some("// User is a user."));

    let fields = &type_specs(&f)[0].ty.fields.list;
    assert_eq!(text(&f, fields[0].comment).as_deref(), Some("// the name"));
    assert!(fields[1].doc.is_none());
    assert_eq!(f.comments.len(), 3);
}

#[test]
fn adjacent_comments_form_one_group() {
    let f = assert_parses("// a\n// b\n/* c */\ntype A {}\n");
    let Decl::Gen(g) = &f.decls[0] else {
        panic!("expected type decl");
    };
    assert_eq!(text(&f, g.doc).as_deref(), Some("// a\n// b\n/* c */"));
}

#[test]
fn route_doc_comment() {
    let f = assert_parses(
        "service A {\n\t// fetch one\n\t@doc \"x\"\n\t@handler h\n\tget /a // inline\n}\n",
    );
    let svc = f.services().next().expect("service");
    let route = &svc.api.routes[0];
    assert_eq!(text(&f, route.doc).as_deref(), Some("// fetch one"));
    assert_eq!(text(&f, route.comment).as_deref(), Some("// inline"));
}

#[test]
fn trailing_comment_at_eof() {
    let f = assert_parses("type A {} // last");
    assert_eq!(text(&f, type_specs(&f)[0].comment).as_deref(), Some("// last"));
}

#[test]
fn route_lead_comment_after_annotations() {
    let f = assert_parses("service S {\n\t@handler h\n\t// c\n\tget /a\n}\n");
    let svc = f.services().next().expect("service");
    let route = &svc.api.routes[0];
    assert!(route.doc.is_none());
    assert_eq!(text(&f, route.route.doc).as_deref(), Some("// c"));

    // Without annotations the comment belongs to the route declaration.
    let f = assert_parses("service S {\n\t// c\n\tget /a\n}\n");
    let route = &f.services().next().expect("service").api.routes[0];
    assert_eq!(text(&f, route.doc).as_deref(), Some("// c"));
    assert!(route.route.doc.is_none());
}

#[test]
fn comments_after_opening_delimiters() {
    let f = assert_parses(
        "info ( // i\n\ta: b\n)\ntype ( // g\n\tA { // s\n\t}\n)\n@server ( // e\n\tgroup: g\n)\nservice S { // r\n}\n",
    );
    let info = f.info.as_ref().expect("info decl");
    assert_eq!(text(&f, info.opening).as_deref(), Some("// i"));
    assert!(info.elements[0].doc.is_none());

    let Decl::Gen(g) = &f.decls[0] else {
        panic!("expected type group");
    };
    assert_eq!(text(&f, g.opening).as_deref(), Some("// g"));
    assert_eq!(text(&f, type_specs(&f)[0].ty.fields.opening).as_deref(), Some("// s"));

    let svc = f.services().next().expect("service");
    let ext = svc.ext.as_ref().expect("@server block");
    assert_eq!(text(&f, ext.opening).as_deref(), Some("// e"));
    assert_eq!(text(&f, svc.api.opening).as_deref(), Some("// r"));
}

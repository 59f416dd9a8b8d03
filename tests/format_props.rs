use apifmt::format;
use proptest::prelude::*;

fn space() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![" ", "  ", "\t", " \t "])
}

fn field_type() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "string",
        "int64",
        "bool",
        "[]string",
        "*User",
        "[]*Item",
        "map[string]int",
        "map[string][]string",
    ])
}

fn trailing_comment() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec!["// note", "/* c */", "// x y"]))
}

fn field() -> impl Strategy<Value = String> {
    (
        "[A-Z][a-zA-Z0-9]{0,7}",
        space(),
        field_type(),
        prop::option::of("[a-z]{1,6}"),
        trailing_comment(),
        any::<bool>(),
    )
        .prop_map(|(name, sp, ty, tag, comment, doc)| {
            let mut line = String::new();
            if doc {
                line.push_str("// about ");
                line.push_str(&name);
                line.push('\n');
            }
            line.push_str(&name);
            line.push_str(sp);
            line.push_str(ty);
            if let Some(tag) = tag {
                line.push_str(&format!("{sp}`json:\"{tag}\"`"));
            }
            if let Some(c) = comment {
                line.push_str(sp);
                line.push_str(c);
            }
            line
        })
}

fn type_decl() -> impl Strategy<Value = String> {
    (
        "[A-Z][a-z]{0,6}",
        prop::collection::vec(field(), 0..6),
        any::<bool>(),
    )
        .prop_map(|(name, fields, blank)| {
            let sep = if blank { "\n\n" } else { "\n" };
            format!("type {name} {{\n{}\n}}\n", fields.join(sep))
        })
}

fn route() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["get", "post", "put", "delete"]),
        "/[a-z]{1,5}(/:[a-z]{1,3})?",
        prop::option::of("[A-Z][a-z]{0,4}"),
        prop::option::of("[A-Z][a-z]{0,4}"),
        prop::option::of("[a-z]{1,8}"),
        trailing_comment(),
    )
        .prop_map(|(method, path, req, resp, handler, comment)| {
            let mut s = String::new();
            if let Some(h) = handler {
                s.push_str(&format!("@handler {h}\n"));
            }
            s.push_str(&format!("{method} {path}"));
            if let Some(req) = req {
                s.push_str(&format!(" ({req})"));
            }
            if let Some(resp) = resp {
                s.push_str(&format!(" returns ({resp})"));
            }
            if let Some(c) = comment {
                s.push(' ');
                s.push_str(c);
            }
            s
        })
}

fn service() -> impl Strategy<Value = String> {
    (
        prop::option::of("[a-z]{1,6}"),
        "[a-z][a-z-]{0,8}",
        prop::collection::vec(route(), 0..4),
    )
        .prop_map(|(group, name, routes)| {
            let ext = group
                .map(|g| format!("@server(\ngroup: {g}\n)\n"))
                .unwrap_or_default();
            format!("{ext}service {name} {{\n{}\n}}\n", routes.join("\n"))
        })
}

fn api_file() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        prop::collection::vec("[a-z]{1,6}", 0..3),
        prop::collection::vec(type_decl(), 0..3),
        prop::collection::vec(service(), 0..2),
    )
        .prop_map(|(syntax, imports, types, services)| {
            let mut src = String::new();
            if syntax {
                src.push_str("syntax = \"v1\"\n");
            }
            for i in imports {
                src.push_str(&format!("import \"{i}.api\"\n"));
            }
            src.push_str(&types.concat());
            src.push_str(&services.concat());
            src
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn formatting_is_idempotent(src in api_file()) {
        let once = format(src.as_bytes(), "p.api");
        prop_assert!(once.is_ok(), "generated source failed: {:?}\n{src}", once.err());
        let once = once.unwrap_or_default();

        let twice = format(&once, "p.api");
        prop_assert_eq!(twice.ok(), Some(once.clone()), "not idempotent for:\n{}", src);
    }

    #[test]
    fn formatting_is_deterministic(src in api_file()) {
        prop_assert_eq!(format(src.as_bytes(), "a.api").ok(), format(src.as_bytes(), "b.api").ok());
    }

    #[test]
    fn never_panics(src in prop::collection::vec(any::<u8>(), 0..300)) {
        let _ = format(&src, "p.api");
    }

    #[test]
    fn never_panics_on_near_misses(src in api_file(), cut in any::<prop::sample::Index>()) {
        let bytes = src.as_bytes();
        let at = if bytes.is_empty() { 0 } else { cut.index(bytes.len()) };
        let _ = format(&bytes[..at], "p.api");
    }
}

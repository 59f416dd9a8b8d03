use apifmt::lexer::{tokenize, ScanMode};
use apifmt::token::Token;
use proptest::prelude::*;

const ALL: ScanMode = ScanMode {
    comments: true,
    insert_semis: true,
};

/// Bytes biased towards the characters that matter to the scanner.
fn api_bytes() -> impl Strategy<Value = Vec<u8>> {
    let interesting = prop::sample::select(
        b"abc /:*=()[]{},;~\"`\\\n\t\r@".to_vec(),
    );
    prop::collection::vec(prop_oneof![3 => interesting, 1 => any::<u8>()], 0..200)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]
    #[test]
    fn never_panics_and_progresses(src in api_bytes()) {
        let (toks, _) = tokenize("p.api", &src, ALL);

        let mut last = 0usize;
        for (pos, tok, lit) in &toks {
            let at = pos.offset();
            // 1) positions are in bounds and never move backwards
            prop_assert!(at <= src.len(), "offset {at} past end ({}) tok={tok:?}", src.len());
            prop_assert!(at >= last, "moved backwards: {at} < {last} tok={tok:?} src={src:?}");
            last = at;

            // 2) real tokens carry their text
            if tok.is_literal() || *tok == Token::Comment {
                prop_assert!(!lit.is_empty(), "empty literal for {tok:?} at {at}");
            }
        }

        // 3) anti-hang guard: at most a terminator per real token
        let max_steps = src.len().saturating_mul(2) + 1;
        prop_assert!(toks.len() <= max_steps, "too many tokens: {} for {} bytes", toks.len(), src.len());
    }

    #[test]
    fn valid_words_scan_cleanly(words in prop::collection::vec("[a-zA-Z_][a-zA-Z0-9_]{0,8}", 1..20)) {
        let src = words.join(" ");
        let (toks, diags) = tokenize("p.api", src.as_bytes(), ScanMode::default());
        prop_assert!(diags.is_empty());
        let got: Vec<&str> = toks
            .iter()
            .filter(|(_, t, _)| *t == Token::Ident)
            .map(|(_, _, lit)| lit.as_str())
            .collect();
        prop_assert_eq!(got, words.iter().map(String::as_str).collect::<Vec<_>>());
    }
}

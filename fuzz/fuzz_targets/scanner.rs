// fuzz_targets/scanner.rs
#![no_main]

use apifmt::lexer::{tokenize, ScanMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mode = ScanMode {
        comments: true,
        insert_semis: true,
    };
    let (toks, _) = tokenize("fuzz.api", data, mode);

    let mut last = 0usize;
    for (pos, _, _) in &toks {
        let at = pos.offset();
        assert!(at <= data.len());
        assert!(at >= last);
        last = at;
    }
    assert!(toks.len() <= data.len().saturating_mul(2) + 1);
});

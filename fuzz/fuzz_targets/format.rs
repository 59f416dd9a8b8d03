// fuzz_targets/format.rs
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever formats once must be a fixed point.
    if let Ok(once) = apifmt::format(data, "fuzz.api") {
        let twice = apifmt::format(&once, "fuzz.api");
        assert_eq!(twice.ok().as_deref(), Some(once.as_slice()));
    }
});

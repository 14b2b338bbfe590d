#![no_main]

use libfuzzer_sys::fuzz_target;
use strace_compare::parser::parse;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser fails fast on malformed trace text (spec.md §4.4); it
        // must never panic, regardless of how malformed the input is.
        let _ = parse(input);
    }
});

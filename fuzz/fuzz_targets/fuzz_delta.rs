//! Fuzz target for delta application.
//!
//! Tests that arbitrary instruction streams against arbitrary bases
//! fail cleanly and that successful results have the declared size.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    base: Vec<u8>,
    delta: Vec<u8>,
}

fuzz_target!(|input: Input| {
    if let Ok(parsed) = plumb_git::Delta::parse(&input.delta) {
        if let Ok(out) = parsed.apply(&input.base) {
            assert_eq!(out.len(), parsed.result_size);
            assert_eq!(plumb_git::apply_delta(&input.base, &input.delta).ok(), Some(out));
        }
    }
});

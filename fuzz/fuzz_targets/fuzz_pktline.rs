//! Fuzz target for Git pkt-line protocol parsing.
//!
//! Tests that the pkt-line decoder, ref advertisement parser and pack
//! extraction handle arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(packets) = plumb_git::decode_all(data) {
        // every decoded packet re-encodes to the bytes it came from
        let reencoded: Vec<u8> = packets.iter().flat_map(|p| p.encode()).collect();
        assert_eq!(reencoded.len(), data.len());
    }

    let _ = plumb_git::RefAdvertisement::parse(data);
    let _ = plumb_git::extract_pack(data);
});

//! Fuzz target for Git pack file parsing.
//!
//! The input becomes the entry section of a pack with a valid header and
//! trailer, so the fuzzer reaches entry decoding instead of stopping at
//! the checksum.

#![no_main]

use libfuzzer_sys::fuzz_target;
use plumb_storage::ObjectStore;
use sha1::{Digest, Sha1};
use std::sync::OnceLock;
use tempfile::TempDir;

static STORE_DIR: OnceLock<TempDir> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let dir = STORE_DIR.get_or_init(|| TempDir::new().expect("temp dir"));
    let store = ObjectStore::new(dir.path().join("objects"));

    let count = data.first().copied().unwrap_or(0) % 8;
    let mut pack = plumb_git::PACK_SIGNATURE.to_vec();
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&u32::from(count).to_be_bytes());
    pack.extend_from_slice(data.get(1..).unwrap_or_default());
    let checksum = Sha1::digest(&pack);
    pack.extend_from_slice(&checksum);

    let _ = plumb_git::unpack(&pack, &store);
});

//! Fuzz target for Metadata::parse with arbitrary byte input.
//!
//! Parsing must never panic, and a parsed record must survive a
//! serialize/parse cycle unchanged.
//!
//! Run with: cargo +nightly fuzz run metadata_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use nestpack::Metadata;

fuzz_target!(|data: &[u8]| {
    let metadata = Metadata::parse(data);
    let reparsed = Metadata::parse(&metadata.to_bytes());
    assert_eq!(metadata, reparsed);
});

//! Fuzz target running the pipeline over arbitrary bytes.
//!
//! The input is written to disk as a package and processed with every
//! archive forced through the full pass. Errors are expected for malformed
//! input; panics and leftover temporary directories are not.
//!
//! Run with: cargo +nightly fuzz run archive_process

#![no_main]

use libfuzzer_sys::fuzz_target;
use nestpack::steps::ConditionStep;
use nestpack::{ArchiveProcessor, ProcessOptions, StepChain, TEMP_PREFIX};

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let input = dir.path().join("fuzz.pkg");
    if std::fs::write(&input, data).is_err() {
        return;
    }
    let out = dir.path().join("out");

    let processor = ArchiveProcessor::new(StepChain::new().with(ConditionStep::new()))
        .with_options(ProcessOptions::new().process_all(true));
    let _ = processor.process(&input, &out);

    if let Ok(entries) = std::fs::read_dir(&out) {
        for entry in entries.flatten() {
            assert!(!entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX));
        }
    }
});

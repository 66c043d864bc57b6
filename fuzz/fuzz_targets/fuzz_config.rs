//! Fuzz target for config.json parsing.
//!
//! Tests that configuration parsing and validation handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pl_common::config::ConfigFile;

fuzz_target!(|data: &[u8]| {
    // Should never panic, only return an error
    if let Ok(file) = serde_json::from_slice::<ConfigFile>(data) {
        let _ = file.validate();
    }
});

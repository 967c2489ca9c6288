//! Fuzz target for process-table parsing.
//!
//! Tests that `parse_ps` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::parsers::parse_ps;

fuzz_target!(|data: &str| {
    // The parser should never panic, only skip malformed rows
    let _ = parse_ps(data);
});

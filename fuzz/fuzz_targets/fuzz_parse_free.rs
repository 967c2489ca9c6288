//! Fuzz target for memory-listing parsing.
//!
//! Tests that `parse_free` and `parse_size` handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::parsers::{parse_free, parse_size};

fuzz_target!(|data: &str| {
    let _ = parse_free(data);
    let _ = parse_size(data);
});

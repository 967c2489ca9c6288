//! Fuzz target for disk-usage parsing.
//!
//! Tests that `parse_df` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::parsers::parse_df;

fuzz_target!(|data: &str| {
    let _ = parse_df(data);
});

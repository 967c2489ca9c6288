//! Fuzz target for thermal-sensor parsing.
//!
//! Tests that `parse_sensors` handles arbitrary input without
//! panicking; no match must yield an empty result, not an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::parsers::parse_sensors;

fuzz_target!(|data: &str| {
    let _ = parse_sensors(data);
});

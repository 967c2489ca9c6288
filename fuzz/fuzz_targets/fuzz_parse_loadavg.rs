//! Fuzz target for load-average parsing.
//!
//! Tests that `parse_loadavg` and `parse_uptime` handle arbitrary
//! input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::parsers::{parse_loadavg, parse_uptime};

fuzz_target!(|data: &str| {
    let _ = parse_loadavg(data);
    let _ = parse_uptime(data);
});

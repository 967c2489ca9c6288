//! Fuzz target for command normalization and risk classification.
//!
//! `normalize_command` is specified as pure and total; `classify_risk`
//! must return a tier for any input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_core::collect::normalizer::{classify_risk, normalize_command};

fuzz_target!(|data: &str| {
    let normalized = normalize_command(data);
    // Normalization is idempotent
    assert_eq!(
        normalize_command(&normalized.normalized).normalized,
        normalized.normalized
    );
    let _ = classify_risk(data);
});

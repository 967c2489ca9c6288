//! Fuzz target for TOML config deserialization and compilation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sd_config::{DoctorConfig, DoctorConfigFile};

fuzz_target!(|data: &str| {
    if let Ok(raw) = toml::from_str::<DoctorConfigFile>(data) {
        // Compilation may reject patterns but must not panic
        let _ = DoctorConfig::from_file_struct(raw);
    }
});

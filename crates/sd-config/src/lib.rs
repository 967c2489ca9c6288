//! System Doctor configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the doctor config file (TOML)
//! - The compiled command allowlist
//! - Semantic validation (timeouts, pattern syntax)
//!
//! The core performs no file or network I/O of its own; config is
//! loaded by the caller (CLI) and handed to the engine read-only.

pub mod allowlist;

pub use allowlist::CommandAllowlist;

use sd_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default ceiling for read-only inspection commands (ms).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Default ceiling for mutating commands (ms).
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 60_000;

/// Raw config file contents before pattern compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorConfigFile {
    /// Permitted command patterns (exact strings or anchored regexes).
    #[serde(default = "default_allowlist_patterns")]
    pub allowlist: Vec<String>,

    /// Timeout ceiling for read-risk steps in milliseconds.
    #[serde(default = "default_read_timeout")]
    pub max_read_timeout_ms: u64,

    /// Timeout ceiling for safe-write and high-impact steps in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub max_write_timeout_ms: u64,
}

impl Default for DoctorConfigFile {
    fn default() -> Self {
        Self {
            allowlist: default_allowlist_patterns(),
            max_read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

/// Built-in allowlist patterns.
///
/// Covers the baseline inspection plan plus the commands the built-in
/// fix templates may propose. Anything else is rejected at collection
/// time regardless of risk tier.
pub fn default_allowlist_patterns() -> Vec<String> {
    [
        // Baseline inspection
        "uptime",
        "cat /proc/loadavg",
        "ps .*",
        "free(| .*)",
        "df(| .*)",
        "du .*",
        "sensors",
        "top .*",
        // Built-in fix templates
        "sync",
        "renice .*",
        "kill .*",
        "docker system prune .*",
        "journalctl --vacuum-time=.*",
        "systemctl restart .*",
        "rm -rf /tmp/\\*",
        "swapoff -a && swapon -a",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Compiled, validated doctor configuration.
///
/// Read-only after construction; shared by reference across the
/// pipeline stages of one session.
#[derive(Debug, Clone)]
pub struct DoctorConfig {
    /// Compiled allowlist; a hard gate independent of risk tier.
    pub allowlist: CommandAllowlist,
    /// Timeout ceiling for read-risk steps in milliseconds.
    pub max_read_timeout_ms: u64,
    /// Timeout ceiling for mutating steps in milliseconds.
    pub max_write_timeout_ms: u64,
}

impl DoctorConfig {
    /// Compile a raw config file into a validated config.
    pub fn from_file_struct(raw: DoctorConfigFile) -> Result<Self> {
        if raw.max_read_timeout_ms == 0 {
            return Err(Error::Config("max_read_timeout_ms must be nonzero".into()));
        }
        if raw.max_write_timeout_ms == 0 {
            return Err(Error::Config("max_write_timeout_ms must be nonzero".into()));
        }
        let allowlist = CommandAllowlist::compile(&raw.allowlist)?;
        Ok(DoctorConfig {
            allowlist,
            max_read_timeout_ms: raw.max_read_timeout_ms,
            max_write_timeout_ms: raw.max_write_timeout_ms,
        })
    }

    /// Load and compile a TOML config file.
    pub fn load_toml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: DoctorConfigFile = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        Self::from_file_struct(raw)
    }

    /// Timeout ceiling in milliseconds for a step of the given risk tier.
    pub fn timeout_ms_for(&self, risk: sd_common::Risk) -> u64 {
        match risk {
            sd_common::Risk::Read => self.max_read_timeout_ms,
            _ => self.max_write_timeout_ms,
        }
    }
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self::from_file_struct(DoctorConfigFile::default()).expect("built-in config is valid")
    }
}

//! Compiled command allowlist.
//!
//! Membership is checked against the normalized command string: a
//! command is allowed if any pattern matches it exactly as a string or
//! as an anchored regular expression. The allowlist is a hard gate
//! independent of risk tier; a read-risk command that is not listed is
//! still rejected.

use regex::Regex;
use sd_common::{Error, Result};

/// A set of permitted command patterns, compiled once at config time.
#[derive(Debug, Clone)]
pub struct CommandAllowlist {
    patterns: Vec<AllowPattern>,
}

#[derive(Debug, Clone)]
struct AllowPattern {
    raw: String,
    regex: Regex,
}

impl CommandAllowlist {
    /// Compile patterns into an allowlist.
    ///
    /// Each pattern is anchored (`^...$`) so `ps .*` matches any `ps`
    /// invocation but `kill` does not match `killall`.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let anchored = format!("^(?:{})$", raw);
            let regex = Regex::new(&anchored).map_err(|e| Error::InvalidAllowlistPattern {
                pattern: raw.clone(),
                reason: e.to_string(),
            })?;
            compiled.push(AllowPattern {
                raw: raw.clone(),
                regex,
            });
        }
        Ok(CommandAllowlist { patterns: compiled })
    }

    /// An allowlist that rejects everything.
    pub fn empty() -> Self {
        CommandAllowlist {
            patterns: Vec::new(),
        }
    }

    /// Check whether a normalized command is permitted.
    pub fn matches(&self, command: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.raw == command || p.regex.is_match(command))
    }

    /// The raw patterns, for display and config snapshots.
    pub fn raw_patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.raw.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

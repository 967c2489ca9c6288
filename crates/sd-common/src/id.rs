//! Session and step identity types.
//!
//! Session identity is supplied by the surrounding application at engine
//! construction so that the caller controls correlation; the generator
//! here exists for callers (the CLI included) that have no identity
//! scheme of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session ID for tracking diagnostic sessions.
///
/// Format: `sd-YYYYMMDD-HHMMSS-XXXX`
/// Example: `sd-20260115-143022-a7xq`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new session ID.
    pub fn new() -> Self {
        let now = Utc::now();
        let suffix = generate_base32_suffix();
        SessionId(format!(
            "sd-{}-{}-{}",
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            suffix
        ))
    }

    /// Parse an existing session ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 23 {
            return None;
        }
        let bytes = s.as_bytes();
        if bytes.first() != Some(&b's')
            || bytes.get(1) != Some(&b'd')
            || bytes.get(2) != Some(&b'-')
            || bytes.get(11) != Some(&b'-')
            || bytes.get(18) != Some(&b'-')
        {
            return None;
        }
        let date = &s[3..11];
        let time = &s[12..18];
        let suffix = &s[19..23];
        if !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(SessionId(s.to_string()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Step ID referencing a step within a plan and its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(s: impl Into<String>) -> Self {
        StepId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        StepId(s.to_string())
    }
}

/// Session metadata supplied by the caller at engine construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Caller-supplied session identity for correlation.
    pub session_id: SessionId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
}

impl SessionMeta {
    /// Create session metadata with a fresh ID starting now.
    pub fn generate() -> Self {
        SessionMeta {
            session_id: SessionId::new(),
            started_at: Utc::now(),
        }
    }
}

/// Generate a 4-character base32 suffix from uuid randomness.
fn generate_base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let mut value = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
    value &= 0x000F_FFFF;
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut out = String::with_capacity(4);
    for shift in [15_u32, 10, 5, 0] {
        let idx = ((value >> shift) & 0x1F) as usize;
        out.push(alphabet[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = SessionId::new();
        assert!(id.0.starts_with("sd-"));
        assert_eq!(id.0.len(), 23);
    }

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.0).expect("generated id should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_session_id_rejects_malformed() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("xx-20260115-143022-a7xq").is_none());
        assert!(SessionId::parse("sd-2026x115-143022-a7xq").is_none());
        assert!(SessionId::parse("sd-20260115-143022-A7XQ").is_none());
        assert!(SessionId::parse("sd-20260115-143022-a7xq-extra").is_none());
    }

    #[test]
    fn test_step_id_display() {
        let id = StepId::new("uptime");
        assert_eq!(id.to_string(), "uptime");
        assert_eq!(id.as_str(), "uptime");
    }

    #[test]
    fn test_session_meta_generate() {
        let meta = SessionMeta::generate();
        assert!(SessionId::parse(&meta.session_id.0).is_some());
    }
}

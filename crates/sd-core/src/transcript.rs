//! Append-only session transcript.
//!
//! The transcript is an owned, growable sequence on the engine exposing
//! only append and read-all; it is never edited or reordered, which is
//! what makes the export a faithful session replay. The structured
//! export carries a SHA-256 hash chain (each entry hashes its payload
//! plus the previous entry's hash) so the exported artifact is
//! tamper-evident; [`verify_chain`] re-validates a full export.

use crate::diagnose::DiagnosisBundle;
use crate::exec::StreamKind;
use crate::report::Outcome;
use crate::rules::Finding;
use crate::verify::{CheckOutcome, VerificationResult};
use chrono::{DateTime, Utc};
use sd_common::{Risk, SessionMeta, StepId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seed for the export hash chain.
pub const GENESIS_HASH: &str = "genesis";

/// Cap on stdout captured into an output event.
pub const OUTPUT_EVENT_CAP: usize = 1000;

/// One event in the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    /// Stage 1: user intent captured.
    Intent { ts: DateTime<Utc>, text: String },
    /// A step was handed to the executor.
    Exec {
        ts: DateTime<Utc>,
        step_id: StepId,
        command: String,
        risk: Risk,
    },
    /// Output captured from a successful step (capped).
    Output {
        ts: DateTime<Utc>,
        step_id: StepId,
        stream: StreamKind,
        data: String,
    },
    /// A rule emitted a finding.
    Finding { ts: DateTime<Utc>, finding: Finding },
    /// Diagnosis ranked.
    Diagnosis {
        ts: DateTime<Utc>,
        diagnosis: DiagnosisBundle,
    },
    /// Gate or allowlist decision for a step.
    Approval {
        ts: DateTime<Utc>,
        step_id: StepId,
        approved: bool,
        /// The literal confirmation text typed, recorded for audit.
        #[serde(skip_serializing_if = "Option::is_none")]
        typed: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Before/after verification result.
    Verification {
        ts: DateTime<Utc>,
        verification: VerificationSummary,
    },
    /// Terminal outcome of the session.
    Summary { ts: DateTime<Utc>, outcome: Outcome },
}

impl TranscriptEvent {
    /// Stage tag for display.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptEvent::Intent { .. } => "intent",
            TranscriptEvent::Exec { .. } => "exec",
            TranscriptEvent::Output { .. } => "output",
            TranscriptEvent::Finding { .. } => "finding",
            TranscriptEvent::Diagnosis { .. } => "diagnosis",
            TranscriptEvent::Approval { .. } => "approval",
            TranscriptEvent::Verification { .. } => "verification",
            TranscriptEvent::Summary { .. } => "summary",
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            TranscriptEvent::Intent { ts, .. }
            | TranscriptEvent::Exec { ts, .. }
            | TranscriptEvent::Output { ts, .. }
            | TranscriptEvent::Finding { ts, .. }
            | TranscriptEvent::Diagnosis { ts, .. }
            | TranscriptEvent::Approval { ts, .. }
            | TranscriptEvent::Verification { ts, .. }
            | TranscriptEvent::Summary { ts, .. } => *ts,
        }
    }
}

/// Verification result without the full evidence bundles, as recorded
/// in the transcript (the bundles live in the verification artifact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub ok: bool,
    pub checks: Vec<CheckOutcome>,
}

impl From<&VerificationResult> for VerificationSummary {
    fn from(result: &VerificationResult) -> Self {
        VerificationSummary {
            ok: result.ok,
            checks: result.checks.clone(),
        }
    }
}

/// Append-only event sequence for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    events: Vec<TranscriptEvent>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. There is deliberately no way to remove or
    /// reorder entries.
    pub fn append(&mut self, event: TranscriptEvent) {
        self.events.push(event);
    }

    /// Read-only view of all events in append order.
    pub fn events(&self) -> &[TranscriptEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Export format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "structured" => Ok(ExportFormat::Json),
            "text" | "human" => Ok(ExportFormat::Text),
            _ => Err(format!("unknown export format: {}", s)),
        }
    }
}

/// An event plus its chain hashes, as written to the structured export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedEvent {
    #[serde(flatten)]
    pub event: TranscriptEvent,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// The structured export artifact: session metadata plus the ordered,
/// hash-chained event list. Suitable for machine replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptExport {
    pub session: SessionMeta,
    pub transcript: Vec<ChainedEvent>,
}

fn entry_hash(event: &TranscriptEvent, prev_hash: &str) -> String {
    let payload = serde_json::to_string(event).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the chained structured export.
pub fn build_export(session: &SessionMeta, events: &[TranscriptEvent]) -> TranscriptExport {
    let mut chained = Vec::with_capacity(events.len());
    let mut prev = GENESIS_HASH.to_string();

    for event in events {
        let hash = entry_hash(event, &prev);
        chained.push(ChainedEvent {
            event: event.clone(),
            prev_hash: prev,
            entry_hash: hash.clone(),
        });
        prev = hash;
    }

    TranscriptExport {
        session: session.clone(),
        transcript: chained,
    }
}

/// Render the structured export as pretty JSON.
pub fn export_json(session: &SessionMeta, events: &[TranscriptEvent]) -> String {
    let export = build_export(session, events);
    serde_json::to_string_pretty(&export).unwrap_or_else(|_| "{}".to_string())
}

/// Render the human-readable text export: a session header followed by
/// one block per event showing its stage tag, timestamp, and payload.
pub fn export_text(session: &SessionMeta, events: &[TranscriptEvent]) -> String {
    let mut text = String::new();
    text.push_str("System Doctor Report\n");
    text.push_str(&"=".repeat(50));
    text.push('\n');
    text.push_str(&format!("Session: {}\n", session.session_id));
    text.push_str(&format!("Started: {}\n", session.started_at.to_rfc3339()));

    for event in events {
        text.push_str(&format!(
            "\n[{}] {}\n",
            event.kind().to_uppercase(),
            event.ts().to_rfc3339()
        ));
        let payload = serde_json::to_string_pretty(event).unwrap_or_else(|_| "{}".to_string());
        text.push_str(&payload);
        text.push('\n');
    }

    text
}

/// Where a chain verification failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBreak {
    pub index: usize,
    pub reason: String,
}

/// Result of validating an export's hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breaks: Vec<ChainBreak>,
}

/// Walk an export and re-validate every link of the hash chain.
pub fn verify_chain(export: &TranscriptExport) -> ChainVerification {
    let mut breaks = Vec::new();
    let mut prev = GENESIS_HASH.to_string();

    for (index, entry) in export.transcript.iter().enumerate() {
        if entry.prev_hash != prev {
            breaks.push(ChainBreak {
                index,
                reason: format!(
                    "prev_hash mismatch: expected {}, found {}",
                    prev, entry.prev_hash
                ),
            });
        }
        let expected = entry_hash(&entry.event, &entry.prev_hash);
        if entry.entry_hash != expected {
            breaks.push(ChainBreak {
                index,
                reason: "entry_hash does not match payload".to_string(),
            });
        }
        prev = entry.entry_hash.clone();
    }

    ChainVerification {
        is_valid: breaks.is_empty(),
        entry_count: export.transcript.len(),
        breaks,
    }
}

//! The eleven-stage pipeline orchestrator.
//!
//! Intake → Triage → Inspect-plan → Collect → Interpret → Diagnose →
//! Recommend → Gate → Execute → Verify → Report. One engine instance is
//! scoped to exactly one diagnostic session; it owns the append-only
//! transcript and exposes one method per stage so a caller (CLI, UI, or
//! test harness) can drive the pipeline interactively or fully
//! automated. Steps run strictly sequentially: later steps may depend
//! on state changed by earlier ones, and transcript order must match
//! execution order exactly.

use crate::collect::normalizer::{is_allowed, normalize_command};
use crate::collect::parsers::build_evidence;
use crate::collect::{EvidenceBundle, RawStepRecord, Step, StepOutput};
use crate::diagnose::{self, DiagnosisBundle, DiagnosisCandidate};
use crate::exec::{ProcessExecutor, StreamCallback, StreamKind};
use crate::plan::Plan;
use crate::recommend::{self, FixOption, FixTemplate};
use crate::report::{self, ActionTaken, Outcome};
use crate::rules::{generate_findings, Finding, RuleRegistry};
use crate::transcript::{
    export_json, export_text, ExportFormat, Transcript, TranscriptEvent, VerificationSummary,
    OUTPUT_EVENT_CAP,
};
use crate::triage::{self, TriageResult};
use crate::verify::{run_checks, Check, VerificationResult};
use chrono::Utc;
use sd_common::{Error, Result, SessionMeta, StepId};
use sd_config::DoctorConfig;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Execution options for a fix plan.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller confirmed execution of mutating steps.
    pub confirmed: bool,
    /// Literal confirmation text typed by the user.
    pub confirmation_text: Option<String>,
}

/// The pipeline orchestrator for one diagnostic session.
pub struct SystemDoctorEngine<E: ProcessExecutor> {
    config: DoctorConfig,
    session: SessionMeta,
    executor: E,
    registry: RuleRegistry,
    transcript: Transcript,
}

impl<E: ProcessExecutor> SystemDoctorEngine<E> {
    /// Build an engine with the built-in rule set.
    pub fn new(config: DoctorConfig, session: SessionMeta, executor: E) -> Self {
        Self::with_registry(config, session, executor, RuleRegistry::with_defaults())
    }

    /// Build an engine with a caller-supplied rule registry.
    pub fn with_registry(
        config: DoctorConfig,
        session: SessionMeta,
        executor: E,
        registry: RuleRegistry,
    ) -> Self {
        SystemDoctorEngine {
            config,
            session,
            executor,
            registry,
            transcript: Transcript::new(),
        }
    }

    pub fn session(&self) -> &SessionMeta {
        &self.session
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Stage 1: Intake. Capture user intent.
    pub fn intake(&mut self, intent: &str) {
        info!(intent, "intake");
        self.transcript.append(TranscriptEvent::Intent {
            ts: Utc::now(),
            text: intent.to_string(),
        });
    }

    /// Stage 2: Triage. Classify the symptom and suggest inspection
    /// steps. Pure; never yields an empty plan.
    pub fn triage(&self, intent: &str) -> TriageResult {
        triage::triage(intent)
    }

    /// Stage 3: Build the inspect plan.
    pub fn build_inspect_plan(&self, intent: &str, playbook_id: Option<&str>) -> Plan {
        let triaged = self.triage(intent);
        let symptoms = if triaged.symptom_keywords.is_empty() {
            "general check".to_string()
        } else {
            triaged.symptom_keywords.join(", ")
        };

        Plan::inspect(
            intent,
            playbook_id.unwrap_or(&triaged.matched_playbook),
            format!("Inspecting system to diagnose: {}", symptoms),
            triaged.suggested_steps,
        )
    }

    /// Stage 4: Collect evidence.
    ///
    /// Steps run sequentially; allowlist rejection and command failure
    /// are per-step soft failures recorded as failed outputs, never an
    /// abort. A fresh bundle is built per call.
    pub fn collect_evidence(
        &mut self,
        steps: &[Step],
        mut on_stream: Option<StreamCallback<'_>>,
    ) -> EvidenceBundle {
        let mut records: BTreeMap<StepId, RawStepRecord> = BTreeMap::new();

        for step in steps {
            let started = Instant::now();
            let output = self.run_step(step, on_stream.as_deref_mut());
            records.insert(
                step.id.clone(),
                RawStepRecord::from_output(
                    step.id.clone(),
                    &output,
                    started.elapsed().as_millis() as u64,
                ),
            );
        }

        build_evidence(&records)
    }

    /// Stage 5: Interpret. Run rules over the evidence.
    pub fn interpret(&mut self, evidence: &EvidenceBundle) -> Vec<Finding> {
        let step_outputs: BTreeMap<StepId, StepOutput> = evidence
            .raw
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    StepOutput {
                        stdout: record.stdout.clone(),
                        stderr: record.stderr.clone(),
                        exit_code: record.exit_code,
                    },
                )
            })
            .collect();

        let findings = generate_findings(self.registry.all_rules(), evidence, &step_outputs);

        for finding in &findings {
            self.transcript.append(TranscriptEvent::Finding {
                ts: Utc::now(),
                finding: finding.clone(),
            });
        }

        debug!(count = findings.len(), "interpretation complete");
        findings
    }

    /// Stage 6: Diagnose. Rank candidates into primary + differential.
    pub fn diagnose(
        &mut self,
        findings: &[Finding],
        candidates: &[DiagnosisCandidate],
    ) -> DiagnosisBundle {
        let (primary, differential) = diagnose::score_diagnoses(findings, candidates);

        let bundle = DiagnosisBundle {
            primary,
            differential,
            notes: diagnose::diagnosis_notes(findings),
        };

        self.transcript.append(TranscriptEvent::Diagnosis {
            ts: Utc::now(),
            diagnosis: bundle.clone(),
        });

        info!(
            primary = %bundle.primary.cause_id,
            score = bundle.primary.score,
            "diagnosis ranked"
        );
        bundle
    }

    /// Stage 7: Recommend. Wrap fix templates into options, least
    /// invasive first.
    pub fn recommend(
        &self,
        diagnosis: &DiagnosisBundle,
        templates: &[FixTemplate],
    ) -> Vec<FixOption> {
        recommend::recommend(diagnosis, templates)
    }

    /// Stage 8: Gate. Pure confirmation policy for one step.
    pub fn gate(&self, step: &Step, confirmed: bool, confirmation_text: Option<&str>) -> bool {
        recommend::gate(step, confirmed, confirmation_text)
    }

    /// Stage 9: Execute a fix plan.
    ///
    /// Each step consults the gate first; a denial appends an
    /// `approval: false` event and aborts the entire remaining plan,
    /// because partially applying an ordered mutation sequence is
    /// unsafe. Allowlist rejection and executor failure remain
    /// per-step soft failures.
    pub fn execute_fix(
        &mut self,
        plan: &Plan,
        options: &ExecuteOptions,
        mut on_stream: Option<StreamCallback<'_>>,
    ) -> Result<BTreeMap<StepId, StepOutput>> {
        let mut results = BTreeMap::new();

        for step in &plan.steps {
            // Allowlist rejection is a per-step soft failure and never
            // consults the gate; run_step records it.
            if !is_allowed(&step.command, &self.config.allowlist) {
                let output = self.run_step(step, None);
                results.insert(step.id.clone(), output);
                continue;
            }

            if !self.gate(step, options.confirmed, options.confirmation_text.as_deref()) {
                self.transcript.append(TranscriptEvent::Approval {
                    ts: Utc::now(),
                    step_id: step.id.clone(),
                    approved: false,
                    typed: options.confirmation_text.clone(),
                    reason: Some(format!("{} risk requires confirmation", step.risk)),
                });
                warn!(step = %step.id, risk = %step.risk, "gate denied, aborting plan");
                return Err(Error::GateDenied {
                    step_id: step.id.to_string(),
                    risk: step.risk.to_string(),
                });
            }

            self.transcript.append(TranscriptEvent::Approval {
                ts: Utc::now(),
                step_id: step.id.clone(),
                approved: true,
                typed: options.confirmation_text.clone(),
                reason: None,
            });

            let output = self.run_step(step, on_stream.as_deref_mut());
            results.insert(step.id.clone(), output);
        }

        Ok(results)
    }

    /// Stage 10: Verify. Compare before/after evidence through checks.
    pub fn verify(
        &mut self,
        before: &EvidenceBundle,
        after: &EvidenceBundle,
        checks: &[Check],
    ) -> VerificationResult {
        let result = run_checks(before, after, checks);

        self.transcript.append(TranscriptEvent::Verification {
            ts: Utc::now(),
            verification: VerificationSummary::from(&result),
        });

        result
    }

    /// Stage 11: Report. Produce the terminal outcome.
    pub fn report(
        &mut self,
        diagnosis: &DiagnosisBundle,
        verification: &VerificationResult,
        actions_taken: &[ActionTaken],
    ) -> Outcome {
        let outcome = report::report(diagnosis, verification, actions_taken);

        self.transcript.append(TranscriptEvent::Summary {
            ts: Utc::now(),
            outcome: outcome.clone(),
        });

        outcome
    }

    /// Read-only view of the transcript.
    pub fn transcript(&self) -> &[TranscriptEvent] {
        self.transcript.events()
    }

    /// Export the transcript for replay (json) or reading (text).
    pub fn export_transcript(&self, format: ExportFormat) -> String {
        match format {
            ExportFormat::Json => export_json(&self.session, self.transcript.events()),
            ExportFormat::Text => export_text(&self.session, self.transcript.events()),
        }
    }

    /// Run one step through normalize → allowlist → execute, recording
    /// transcript events. Failures come back as synthetic outputs.
    fn run_step(
        &mut self,
        step: &Step,
        on_stream: Option<&mut (dyn FnMut(&str, StreamKind) + '_)>,
    ) -> StepOutput {
        let normalized = normalize_command(&step.command);

        if !is_allowed(&step.command, &self.config.allowlist) {
            warn!(step = %step.id, command = %step.command, "command not in allowlist");
            self.transcript.append(TranscriptEvent::Approval {
                ts: Utc::now(),
                step_id: step.id.clone(),
                approved: false,
                typed: None,
                reason: Some("command not in allowlist".to_string()),
            });
            return StepOutput::rejected("Command not in allowlist");
        }

        self.transcript.append(TranscriptEvent::Exec {
            ts: Utc::now(),
            step_id: step.id.clone(),
            command: step.command.clone(),
            risk: step.risk,
        });

        let timeout = Duration::from_millis(self.config.timeout_ms_for(step.risk));
        match self.executor.execute(&normalized.normalized, timeout, on_stream) {
            Ok(output) => {
                self.transcript.append(TranscriptEvent::Output {
                    ts: Utc::now(),
                    step_id: step.id.clone(),
                    stream: StreamKind::Stdout,
                    data: output.stdout.chars().take(OUTPUT_EVENT_CAP).collect(),
                });
                StepOutput {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.exit_code,
                }
            }
            Err(e) => {
                warn!(step = %step.id, error = %e, "step execution failed");
                StepOutput::rejected(e.to_string())
            }
        }
    }
}

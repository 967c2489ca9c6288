//! Diagnostic and fix plans.
//!
//! A plan is an ordered list of steps with the intent and reasoning
//! that produced it. Inspect plans come out of triage; fix plans are
//! wrapped by the recommendation generator.

use crate::collect::Step;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which pipeline stage a plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStage {
    Inspect,
    Fix,
}

/// An ordered command plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub intent: String,
    pub playbook_id: String,
    pub stage: PlanStage,
    pub reasoning: String,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Build an inspect plan with a generated id.
    pub fn inspect(
        intent: impl Into<String>,
        playbook_id: impl Into<String>,
        reasoning: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Plan {
            id: format!("inspect-{}", Uuid::new_v4()),
            intent: intent.into(),
            playbook_id: playbook_id.into(),
            stage: PlanStage::Inspect,
            reasoning: reasoning.into(),
            steps,
        }
    }

    /// Build a fix plan with a generated id.
    pub fn fix(
        intent: impl Into<String>,
        playbook_id: impl Into<String>,
        reasoning: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Plan {
            id: format!("fix-{}", Uuid::new_v4()),
            intent: intent.into(),
            playbook_id: playbook_id.into(),
            stage: PlanStage::Fix,
            reasoning: reasoning.into(),
            steps,
        }
    }
}

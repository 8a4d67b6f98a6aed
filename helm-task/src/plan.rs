//! Plan derivation from a [`TaskGoal`].

use serde::{Deserialize, Serialize};

use crate::goal::TaskGoal;

/// Status of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    /// Not started.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Completed successfully.
    Done,
    /// Could not be completed.
    Failed,
}

/// One step of the plan derived from the task's goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Human-readable description.
    pub description: String,
    /// Current status.
    pub status: PlanStepStatus,
}

impl PlanStep {
    fn pending(description: impl Into<String>) -> Self {
        Self { description: description.into(), status: PlanStepStatus::Pending }
    }
}

/// Lifecycle phase of the task as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Plan has been derived but no steps have started.
    Planning,
    /// At least one step is in progress or done, more remain.
    Executing,
    /// All steps attempted; deciding whether more work is needed.
    Reflecting,
    /// Task finished successfully.
    Completed,
    /// Task could not be completed.
    Failed,
}

/// Derive an ordered plan from a goal's flags.
pub fn derive_plan(goal: &TaskGoal) -> Vec<PlanStep> {
    let mut steps = Vec::new();

    if goal.requires_video_probe {
        steps.push(PlanStep::pending("Probe video metadata"));
    }
    if goal.requires_video_download {
        steps.push(PlanStep::pending("Download video"));
    }
    if goal.requires_transcript {
        steps.push(PlanStep::pending("Extract video transcript"));
    }
    if goal.requires_search {
        steps.push(PlanStep::pending("Search for relevant information"));
    }
    if goal.requires_ppt {
        steps.push(PlanStep::pending("Generate presentation artifact"));
    }
    steps.push(PlanStep::pending("Compose final answer"));

    steps
}

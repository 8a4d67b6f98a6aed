//! # helm-task — Task Director (`spec.md` §4.3)
//!
//! Per-session goal/plan state: infers what a user prompt is asking for,
//! derives a plan from that inference, tracks tool-call history, and
//! decides whether a new tool call should be admitted. New code — the
//! teacher has no direct analogue for goal inference or planning — built
//! in the shape of `neuron-runtime`'s guardrail module (a typed
//! pass/deny-with-reason result rather than an exception) and instrumented
//! with `tracing` the way every teacher crate logs decisions.

#![deny(missing_docs)]

pub mod decision;
pub mod goal;
pub mod plan;
pub mod state;

pub use decision::ToolCallDecision;
pub use goal::TaskGoal;
pub use plan::{Phase, PlanStep, PlanStepStatus};
pub use state::{ToolCallHistoryEntry, TaskState};

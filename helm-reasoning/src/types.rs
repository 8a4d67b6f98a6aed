//! Wire and trace types for the reasoning state machine.

use serde::{Deserialize, Serialize};

use helm_proto::{StepId, TraceId};

/// Milliseconds since an arbitrary epoch. The state machine never reads
/// the clock itself — callers supply `now` at every call site — so tests
/// can drive the machine with fully deterministic timestamps.
pub type TimestampMs = i64;

/// Lifecycle phase of a single [`ReasoningEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// A step has begun running.
    Started,
    /// A running step's visible fields changed, but it hasn't finished.
    Updated,
    /// A step has finished; terminal for that step.
    Finished,
}

/// Outcome of a finished step. Only meaningful on `Lifecycle::Finished`
/// events/steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    /// Completed as intended.
    Succeeded,
    /// Completed with an error.
    Failed,
    /// Ended early (turn canceled, finalize forced completion).
    Canceled,
}

/// Observable status of a [`ReasoningStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The single step allowed to be running at any instant.
    Running,
    /// Terminal; never transitions back to `Running`.
    Completed,
}

/// Extra structured detail attached to some steps (tool-shaped ones).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDetails {
    /// Name of the tool this step is executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Search queries issued, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
    /// Sources consulted, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// One input/output record the state machine consumes and (on
/// acceptance) echoes back with an assigned emission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEvent {
    /// Dedupe key: the same `event_id` is accepted at most once.
    pub event_id: String,
    /// The trace this event belongs to.
    pub trace_id: TraceId,
    /// The step this event concerns.
    pub step_id: StepId,
    /// The step's position in the trace; monotone by first-STARTED order.
    pub step_index: u32,
    /// Monotone per-step sequence number guarding against reordered
    /// duplicates.
    pub event_seq: u32,
    /// Lifecycle phase this event represents.
    pub lifecycle: Lifecycle,
    /// Human-readable step label (e.g. "Searching the web").
    pub label: String,
    /// Optional free-text message, carried through to the step on
    /// acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured detail, carried through to the step on acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StepDetails>,
    /// Sanitized chain-of-thought-derived content, carried through on
    /// acceptance (only meaningful on a completed "Reasoning" step).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    /// Only meaningful on `Lifecycle::Finished`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<FinalStatus>,
}

/// A trace element as the state machine's consumers observe it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Step identity.
    pub step_id: StepId,
    /// Position in the trace.
    pub step_index: u32,
    /// Owning trace.
    pub trace_id: TraceId,
    /// Current label.
    pub label: String,
    /// `Running` or `Completed`.
    pub status: StepStatus,
    /// Set once `status == Completed`.
    pub final_status: Option<FinalStatus>,
    /// Emission timestamp of the accepted STARTED event.
    pub started_at: TimestampMs,
    /// Emission timestamp of the accepted FINISHED event.
    pub completed_at: Option<TimestampMs>,
    /// `completed_at - started_at`, once known.
    pub duration_ms: Option<u64>,
    /// Latest free-text message.
    pub message: Option<String>,
    /// Latest structured detail.
    pub details: Option<StepDetails>,
    /// Sanitized chain-of-thought content, if any.
    pub thinking_content: Option<String>,
}

impl ReasoningStep {
    pub(crate) fn from_started(event: &ReasoningEvent, emitted_at: TimestampMs) -> Self {
        Self {
            step_id: event.step_id.clone(),
            step_index: event.step_index,
            trace_id: event.trace_id.clone(),
            label: event.label.clone(),
            status: StepStatus::Running,
            final_status: None,
            started_at: emitted_at,
            completed_at: None,
            duration_ms: None,
            message: event.message.clone(),
            details: event.details.clone(),
            thinking_content: event.thinking_content.clone(),
        }
    }

    pub(crate) fn apply_update(&mut self, event: &ReasoningEvent) {
        self.label = event.label.clone();
        if event.message.is_some() {
            self.message = event.message.clone();
        }
        if event.details.is_some() {
            self.details = event.details.clone();
        }
        if event.thinking_content.is_some() {
            self.thinking_content = event.thinking_content.clone();
        }
    }

    pub(crate) fn apply_finish(&mut self, event: &ReasoningEvent, emitted_at: TimestampMs) {
        self.apply_update(event);
        self.status = StepStatus::Completed;
        self.final_status = event.final_status.or(Some(FinalStatus::Succeeded));
        self.completed_at = Some(emitted_at);
        self.duration_ms = Some((emitted_at - self.started_at).max(0) as u64);
    }
}

//! Shared error taxonomy.
//!
//! Each `helm-*` crate that needs its own error type defines one (see
//! `helm-task::TaskError`, `helm-turn::TurnError` re-export, etc.), but the
//! three error families that cross crate boundaries at the protocol level —
//! tool execution, hook dispatch, and turn-loop termination — live here so
//! `helm-tool`, `helm-turn`, and `helm-graph` can all speak the same
//! vocabulary without a circular dependency.

use std::error::Error as StdError;

/// Errors a tool implementation can report back to the turn loop.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool registered under this name.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// The tool ran but failed; message is surfaced to the model as the
    /// tool result's error content, not as a turn-ending failure.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    /// Arguments failed schema or semantic validation before the tool ran.
    #[error("invalid tool input: {0}")]
    InvalidInput(String),
    /// The tool did not finish within its allotted budget.
    #[error("tool call timed out after {0}ms")]
    TimedOut(u64),
    /// Denied by the admission gate (e.g. search-class quota exhausted)
    /// before the tool was ever invoked.
    #[error("tool call denied: {0}")]
    Denied(String),
    /// Catch-all for a tool's own error type, preserved via `?`.
    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Errors raised while dispatching the observability hook pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HookError {
    /// A hook's own logic failed. Dispatch treats this as non-fatal and
    /// continues the pipeline (logged, never silently dropped) unless the
    /// hook explicitly returned `HookAction::Halt`.
    #[error("hook failed: {0}")]
    Failed(String),
    /// Catch-all, preserved via `?`.
    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Errors that can end a turn outside the normal exit-reason taxonomy.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TurnError {
    /// The model provider returned an error classified as retryable by the
    /// caller's retry policy; the turn loop itself does not retry.
    #[error("provider error: {0}")]
    Provider(String),
    /// A hook halted the turn.
    #[error("halted by hook: {0}")]
    HookHalt(String),
    /// Persistence collaborator rejected a write (not counting the
    /// foreign-key race, which is swallowed rather than surfaced here).
    #[error("state error: {0}")]
    State(String),
    /// Catch-all, preserved via `?`.
    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

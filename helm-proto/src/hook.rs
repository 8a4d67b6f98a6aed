//! Observability hook seam for the turn loop.
//!
//! Grounded on the teacher's hook protocol, renamed to the spec's own
//! vocabulary (model call / tool call rather than inference / tool use).
//! A hook is a passive observer by default; it earns the ability to steer
//! execution only through the handful of [`HookAction`] variants below —
//! everything else about the turn loop is invisible to it.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HookError;
use crate::id::{SessionId, StepId, TraceId};

/// Points in the turn loop where registered hooks are given a chance to
/// observe or intervene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Immediately before a model call is dispatched.
    PreModelCall,
    /// Immediately after a model call returns (success or provider error).
    PostModelCall,
    /// Immediately before a single tool call is executed.
    PreToolCall,
    /// Immediately after a tool call returns.
    PostToolCall,
    /// Just before deciding whether the turn loop continues or exits.
    ExitCheck,
}

/// Read-only-by-default context handed to a hook at dispatch time.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The session this turn belongs to.
    pub session_id: SessionId,
    /// The reasoning trace for the turn currently executing.
    pub trace_id: TraceId,
    /// The step in progress, if the hook point is step-scoped.
    pub step_id: Option<StepId>,
    /// Point-specific payload: request/response bodies, tool name and
    /// input/output. Left as `Value` so hook points can carry different
    /// shapes without a enum-of-enums in this crate.
    pub payload: Value,
}

impl HookContext {
    /// Construct a context with no step association and an empty payload.
    pub fn new(session_id: SessionId, trace_id: TraceId) -> Self {
        Self {
            session_id,
            trace_id,
            step_id: None,
            payload: Value::Null,
        }
    }

    /// Attach a step id (builder style).
    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    /// Attach a payload (builder style).
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// What a hook wants the turn loop to do after it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum HookAction {
    /// No intervention; proceed as planned.
    Continue,
    /// Stop the turn now with this reason (surfaces as an
    /// `ExitReason::ObserverHalt` on `helm-turn`'s turn output).
    Halt {
        /// Human-readable halt reason.
        reason: String,
    },
    /// Valid only at `PreToolCall`: skip the call entirely and synthesize
    /// an error tool result instead of invoking the tool.
    SkipTool {
        /// Why the call was skipped.
        reason: String,
    },
    /// Valid only at `PreToolCall`: run the tool with this input instead of
    /// the one the model proposed.
    ModifyToolInput {
        /// Replacement input.
        new_input: Value,
    },
    /// Valid only at `PostToolCall`: report this output instead of the
    /// tool's actual return value.
    ModifyToolOutput {
        /// Replacement output.
        new_output: Value,
    },
}

impl HookAction {
    /// True if this action does not request any deviation from the plan.
    pub fn is_continue(&self) -> bool {
        matches!(self, HookAction::Continue)
    }
}

/// An observer (or light interceptor) of the turn loop.
///
/// Implementors should be cheap to invoke at every registered point; a
/// hook that needs to do expensive work should spawn it rather than block
/// the turn loop. A hook that errors is logged and treated as
/// `HookAction::Continue` — a broken hook must never itself end a turn.
#[async_trait]
pub trait ObservabilityHook: Send + Sync {
    /// Which points this hook wants to be dispatched at. Hooks not
    /// interested in a point are skipped without a dispatch call.
    fn points(&self) -> &[HookPoint];

    /// Handle one dispatch at the given point.
    async fn on_event(
        &self,
        point: HookPoint,
        ctx: &HookContext,
    ) -> Result<HookAction, HookError>;
}

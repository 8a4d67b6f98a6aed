//! The outbound event contract (`spec.md` §6): every type the core emits
//! over the session's event channel, plus the [`EventSink`] collaborator
//! seam the turn loop writes through.
//!
//! Grounded on the teacher's `layer0::hook`/`neuron-hooks` discipline of
//! a small closed vocabulary dispatched through one trait, generalized
//! from hook points into the wire-level SSE event union `spec.md` §6
//! names directly (`message.start`, `reasoning.step`, `tool.complete`, …).

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use helm_proto::{MessageId, SessionId, ToolCallId};
use helm_reasoning::ReasoningStep;
use helm_tool::Artifact;

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Ended normally with a final assistant message.
    Stop,
    /// The dynamic budget was exceeded.
    Timeout,
    /// `stepsTaken` reached `maxToolSteps`.
    MaxSteps,
}

/// Every event type the core can emit, per `spec.md` §6.
///
/// `session.end` is declared here but never constructed by
/// [`crate::turn::process_agent_turn`] — its emission is a transport-layer
/// decision. `agent.start`/`agent.node`/`agent.error` belong to the
/// scenario-graph endpoint (`helm-graph`/`helm-research`) and deliberately
/// have no variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HelmEvent {
    /// The assistant has begun composing a response.
    #[serde(rename = "message.start")]
    MessageStart,
    /// A fragment of the assistant's draft text.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment.
        delta: String,
    },
    /// The assistant's final message for this turn.
    #[serde(rename = "message.complete")]
    MessageComplete {
        /// Full final text.
        content: String,
        /// Why the turn ended.
        finish_reason: FinishReason,
        /// Set once the message is persisted; `None` if persistence never
        /// ran or was swallowed (`spec.md` §8 scenario 6).
        assistant_message_id: Option<MessageId>,
    },
    /// A hidden reasoning pass has begun (precedes the first
    /// `reasoning.step` of a "Reasoning" step).
    #[serde(rename = "thinking.start")]
    ThinkingStart,
    /// A reasoning step's current state, per `spec.md` §4.4.
    #[serde(rename = "reasoning.step")]
    ReasoningStep {
        /// The step, as the Reasoning Event State Machine currently sees it.
        step: ReasoningStep,
    },
    /// A tool call has been admitted and is about to run.
    #[serde(rename = "tool.start")]
    ToolStart {
        /// Which call.
        tool_call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Input the tool will run with (post admission adjustments).
        input: Value,
    },
    /// Fire-and-forget progress from a running tool call.
    #[serde(rename = "tool.progress")]
    ToolProgress {
        /// Which call.
        tool_call_id: ToolCallId,
        /// Progress payload, opaque to the core.
        payload: Value,
    },
    /// A tool call finished successfully.
    #[serde(rename = "tool.complete")]
    ToolComplete {
        /// Which call.
        tool_call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Canonical `{success, output, error, artifacts, previewSnapshots}`
        /// result payload.
        result: Value,
    },
    /// A tool call failed, was denied, or was skipped.
    #[serde(rename = "tool.error")]
    ToolError {
        /// Which call.
        tool_call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Human-readable failure/denial reason.
        error: String,
    },
    /// An artifact produced by a tool call has been persisted.
    #[serde(rename = "file.created")]
    FileCreated {
        /// The persisted artifact.
        artifact: Artifact,
    },
    /// Hints the client to focus an inspector panel on something.
    #[serde(rename = "inspector.focus")]
    InspectorFocus {
        /// Opaque focus target descriptor.
        target: Value,
    },
    /// The loop stopped because `stepsTaken` reached `maxToolSteps`.
    #[serde(rename = "agent.step_limit")]
    AgentStepLimit {
        /// Steps completed before the limit stopped the loop.
        steps_taken: u32,
    },
    /// An unrecoverable error ended the turn without a final message.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description.
        message: String,
    },
    /// The session's event stream is closing. Never constructed by the
    /// turn loop itself; declared for transport layers that emit it.
    #[serde(rename = "session.end")]
    SessionEnd,
    /// A browser automation action was taken.
    #[serde(rename = "browser.action")]
    BrowserAction {
        /// Opaque action descriptor.
        action: Value,
    },
    /// A browser screenshot was captured.
    #[serde(rename = "browser.screenshot")]
    BrowserScreenshot {
        /// Opaque image descriptor (data URL, file reference, …).
        image: Value,
    },
    /// A higher-level browsing activity note (distinct from a raw action).
    #[serde(rename = "browse.activity")]
    BrowseActivity {
        /// Opaque activity descriptor.
        activity: Value,
    },
    /// A screenshot captured by the browsing activity wrapper.
    #[serde(rename = "browse.screenshot")]
    BrowseScreenshot {
        /// Opaque image descriptor.
        image: Value,
    },
    /// The automated browser session closed.
    #[serde(rename = "browser.closed")]
    BrowserClosed,
    /// A sandbox environment is being provisioned for this turn.
    #[serde(rename = "sandbox.provisioning")]
    SandboxProvisioning,
    /// The sandbox environment is ready.
    #[serde(rename = "sandbox.ready")]
    SandboxReady,
    /// The sandbox environment is being torn down.
    #[serde(rename = "sandbox.teardown")]
    SandboxTeardown,
    /// Sandbox provisioning failed and a fallback path was taken.
    #[serde(rename = "sandbox.fallback")]
    SandboxFallback {
        /// Why the sandbox fell back.
        reason: String,
    },
}

/// The outbound event channel collaborator.
///
/// `spec.md` §5: single-writer per turn; emission order is the order
/// subscribers observe, and backpressure (the sink may block) is
/// honored by awaiting each call.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit one event for `session_id` at `timestamp_ms`.
    async fn emit(&self, session_id: &SessionId, timestamp_ms: i64, event: HelmEvent);
}

/// An [`EventSink`] that records every event it receives, in order.
///
/// Test double only — grounded on the teacher's pattern of small in-file
/// collaborator doubles (`neuron-op-react`'s `NullStateReader`) rather
/// than a mocking framework.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(SessionId, i64, HelmEvent)>>,
}

impl RecordingEventSink {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far, in emission order.
    pub fn events(&self) -> Vec<(SessionId, i64, HelmEvent)> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, session_id: &SessionId, timestamp_ms: i64, event: HelmEvent) {
        self.events
            .lock()
            .expect("lock poisoned")
            .push((session_id.clone(), timestamp_ms, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_delta_serializes_with_dotted_type_tag() {
        let event = HelmEvent::MessageDelta { delta: "hi".to_string() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message.delta");
        assert_eq!(json["delta"], "hi");
    }

    #[tokio::test]
    async fn recording_sink_preserves_emission_order() {
        let sink = RecordingEventSink::new();
        let session_id = SessionId::new("sess_1");
        sink.emit(&session_id, 1, HelmEvent::MessageStart).await;
        sink.emit(&session_id, 2, HelmEvent::MessageDelta { delta: "a".into() }).await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, 1);
        assert_eq!(events[1].1, 2);
    }
}

//! The scenario-graph endpoint's own event vocabulary.
//!
//! `spec.md` §9 is explicit that `agent.start`/`agent.node`/`agent.error`
//! belong to the scenario-graph endpoint and must not appear on the turn
//! loop's event stream — so this is a disjoint enum from
//! `helm_turn::HelmEvent`, dispatched through its own sink trait, grounded
//! on the same `layer0::hook`/`neuron-hooks` "small closed vocabulary
//! through one trait" discipline `helm-turn::event` uses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use helm_proto::{SessionId, TraceId};

/// One event emitted while walking a [`crate::graph::ScenarioGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphEvent {
    /// The walk has begun.
    #[serde(rename = "agent.start")]
    AgentStart {
        /// The entry node's id.
        entry_point: String,
    },
    /// A node has finished running (successfully or not).
    #[serde(rename = "agent.node")]
    AgentNode {
        /// The node's id.
        node_id: String,
        /// Whether the node completed without a fatal failure.
        ok: bool,
    },
    /// The walk ended with a fatal, unrecovered failure.
    #[serde(rename = "agent.error")]
    AgentError {
        /// The node where the failure occurred, if the walk had started one.
        node_id: Option<String>,
        /// Human-readable failure description.
        message: String,
    },
}

/// The scenario-graph event channel collaborator.
#[async_trait]
pub trait GraphEventSink: Send + Sync {
    /// Emit one event for `session_id`/`trace_id` at `timestamp_ms`.
    async fn emit(&self, session_id: &SessionId, trace_id: &TraceId, timestamp_ms: i64, event: GraphEvent);
}

/// A no-op sink for callers that don't need to observe graph events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGraphEventSink;

#[async_trait]
impl GraphEventSink for NullGraphEventSink {
    async fn emit(&self, _session_id: &SessionId, _trace_id: &TraceId, _timestamp_ms: i64, _event: GraphEvent) {}
}

/// A [`GraphEventSink`] that records every event it receives, in order.
///
/// Test double only, matching `helm_turn::event::RecordingEventSink`'s
/// in-file collaborator-double idiom.
#[derive(Default)]
pub struct RecordingGraphEventSink {
    events: Mutex<Vec<(SessionId, TraceId, i64, GraphEvent)>>,
}

impl RecordingGraphEventSink {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far, in emission order.
    pub fn events(&self) -> Vec<(SessionId, TraceId, i64, GraphEvent)> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl GraphEventSink for RecordingGraphEventSink {
    async fn emit(&self, session_id: &SessionId, trace_id: &TraceId, timestamp_ms: i64, event: GraphEvent) {
        self.events
            .lock()
            .expect("lock poisoned")
            .push((session_id.clone(), trace_id.clone(), timestamp_ms, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_node_serializes_with_dotted_type_tag() {
        let event = GraphEvent::AgentNode { node_id: "n1".to_string(), ok: true };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent.node");
        assert_eq!(json["node_id"], "n1");
    }

    #[tokio::test]
    async fn recording_sink_preserves_emission_order() {
        let sink = RecordingGraphEventSink::new();
        let session_id = SessionId::new("sess_1");
        let trace_id = TraceId::new("trace_1");
        sink.emit(&session_id, &trace_id, 1, GraphEvent::AgentStart { entry_point: "n1".to_string() }).await;
        sink.emit(&session_id, &trace_id, 2, GraphEvent::AgentNode { node_id: "n1".to_string(), ok: true }).await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].2, 1);
        assert_eq!(events[1].2, 2);
    }
}

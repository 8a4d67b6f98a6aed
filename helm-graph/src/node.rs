//! The per-node contract `spec.md` §4.7 describes: preconditions, an
//! execution function, postconditions, and a state-update function.

use async_trait::async_trait;
use serde_json::Value;

use helm_proto::{SessionId, TraceId};

/// Context threaded through every node call for one graph walk.
///
/// Carries identity only — `spec.md` §9's "graph engine vs. turn loop
/// share no state except identity ids" note applies here directly; a node
/// reaches collaborators (providers, tool registries, stores) through its
/// own fields, not through this context.
#[derive(Debug, Clone)]
pub struct GraphContext {
    /// Session this walk runs within.
    pub session_id: SessionId,
    /// Trace identifying this particular walk, for correlating emitted
    /// `agent.*` events and logs.
    pub trace_id: TraceId,
}

impl GraphContext {
    /// Build a context for one walk.
    pub fn new(session_id: SessionId, trace_id: TraceId) -> Self {
        Self { session_id, trace_id }
    }
}

/// One node in a [`crate::graph::ScenarioGraph`].
///
/// `S` is the single state type threaded through the whole walk; a node's
/// output is an opaque [`Value`] the node itself knows how to fold back into
/// `S` via [`GraphNode::update_state`].
#[async_trait]
pub trait GraphNode<S: Send + Sync>: Send + Sync {
    /// Stable identifier this node is registered under.
    fn id(&self) -> &str;

    /// Checked before `execute` runs. A failing precondition is fatal: the
    /// walk routes to the graph's `failure_handler` if one is set, else
    /// fails the walk outright. The default accepts any state.
    fn preconditions(&self, _state: &S) -> Result<(), String> {
        Ok(())
    }

    /// The node's own work. Errors here are always fatal, same routing as a
    /// failing precondition.
    async fn execute(&self, state: &S, ctx: &GraphContext) -> Result<Value, String>;

    /// Checked against the output `execute` just produced, before
    /// `update_state` folds it in. Fatal on failure, same routing as
    /// preconditions. The default accepts any output.
    fn postconditions(&self, _state: &S, _output: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Fold `output` into `state`, producing the state the next node sees.
    fn update_state(&self, state: S, output: &Value) -> S;
}

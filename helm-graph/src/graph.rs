//! The Scenario Graph Engine (`spec.md` §4.7): a generic executor over a
//! node/edge graph, walked from an entry point until a node routes to
//! `END` or a fatal failure is reached.
//!
//! Grounded on `neuron-orch-kit::runner::OrchestratedRunner::run` for the
//! overall shape — a small runner that loops a current-item, interprets
//! the outcome, and records a trace — generalized from the teacher's fixed
//! dispatch/effect/followup vocabulary into the spec's generic
//! precondition/execute/postcondition/updateState node contract and
//! conditional-then-plain edge routing. `spec.md` §9 is explicit that the
//! graph and the turn loop (`helm-turn`) share no state beyond identity
//! ids and must stay orthogonal — this crate has no dependency on
//! `helm-turn`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;

use crate::edge::{ConditionalEdge, Edge, EdgeTarget};
use crate::event::{GraphEvent, GraphEventSink, NullGraphEventSink};
use crate::node::{GraphContext, GraphNode};

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Errors that can end a walk before it reaches `END`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// `execute` was called with an entry point, or a route, naming a node
    /// that was never registered.
    #[error("no node registered with id {0:?}")]
    UnknownNode(String),
    /// A conditional edge's condition returned a route key with no entry in
    /// its routes table.
    #[error("conditional edge at {from:?} produced unknown route key {route_key:?}")]
    UnknownRoute {
        /// The node the conditional edge originates from.
        from: String,
        /// The route key the condition function returned.
        route_key: String,
    },
    /// A node's precondition failed and no `failure_handler` was set to
    /// recover the walk.
    #[error("precondition failed at {node_id:?}: {reason}")]
    PreconditionFailed {
        /// The node whose precondition rejected the current state.
        node_id: String,
        /// Why.
        reason: String,
    },
    /// A node's `execute` returned an error and no `failure_handler` was
    /// set to recover the walk.
    #[error("execution failed at {node_id:?}: {reason}")]
    ExecutionFailed {
        /// The node that failed.
        node_id: String,
        /// Why.
        reason: String,
    },
    /// A node's postcondition failed and no `failure_handler` was set to
    /// recover the walk.
    #[error("postcondition failed at {node_id:?}: {reason}")]
    PostconditionFailed {
        /// The node whose postcondition rejected its own output.
        node_id: String,
        /// Why.
        reason: String,
    },
}

/// How one node's visit in a walk went, per the recorded trace.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The node ran to completion and its postconditions held.
    Ok,
    /// A precondition rejected the state before the node ran; `reason` is
    /// the failure message. The walk was routed to the failure handler.
    PreconditionFailed(String),
    /// `execute` returned an error; the walk was routed to the failure
    /// handler.
    ExecutionFailed(String),
    /// A postcondition rejected the node's own output; the walk was routed
    /// to the failure handler.
    PostconditionFailed(String),
}

/// One entry in a walk's recorded execution path.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStep {
    /// The node visited.
    pub node_id: String,
    /// How the visit went.
    pub outcome: StepOutcome,
    /// The node's raw output, if it ran at all.
    pub output: Option<Value>,
}

/// Whether a walk reached `END` cleanly or was routed to failure with no
/// recovery available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    /// The walk reached `END`.
    Completed,
    /// The walk hit a fatal failure with no `failure_handler`, or the
    /// `failure_handler` itself failed.
    Failed,
}

/// The result of walking a graph to completion or fatal failure.
pub struct GraphOutcome<S> {
    /// The state as of the walk's last successful `updateState`.
    pub final_state: S,
    /// Every node visited, in visitation order.
    pub trace: Vec<GraphStep>,
    /// How the walk ended.
    pub status: GraphStatus,
}

/// A generic node/edge graph, parameterized over the single state type `S`
/// threaded through every node.
pub struct ScenarioGraph<S> {
    entry_point: String,
    nodes: HashMap<String, Arc<dyn GraphNode<S>>>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge<S>>,
    failure_handler: Option<String>,
    event_sink: Arc<dyn GraphEventSink>,
}

impl<S: Send + Sync> ScenarioGraph<S> {
    fn next_node(&self, from: &str, state: &S) -> Result<EdgeTarget, GraphError> {
        for conditional in &self.conditional_edges {
            if conditional.from == from {
                let route_key = (conditional.condition)(state);
                return conditional
                    .routes
                    .get(&route_key)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownRoute { from: from.to_string(), route_key });
            }
        }
        for edge in &self.edges {
            if edge.from == from {
                return Ok(edge.to.clone());
            }
        }
        // No outgoing edge at all is treated as an implicit END, matching
        // `neuron-orch-kit::runner`'s "queue empties, walk is done" exit.
        Ok(EdgeTarget::End)
    }

    /// Walk the graph from its entry point until `END` or an unrecovered
    /// fatal failure, recording every node visited.
    pub async fn execute(&self, initial_state: S, ctx: &GraphContext) -> Result<GraphOutcome<S>, GraphError>
    where
        S: Clone,
    {
        self.event_sink
            .emit(&ctx.session_id, &ctx.trace_id, now_ms(), GraphEvent::AgentStart { entry_point: self.entry_point.clone() })
            .await;

        let mut state = initial_state;
        let mut current = self.entry_point.clone();
        let mut trace = Vec::new();

        loop {
            let node = self.nodes.get(&current).ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            if let Err(reason) = node.preconditions(&state) {
                trace.push(GraphStep { node_id: current.clone(), outcome: StepOutcome::PreconditionFailed(reason.clone()), output: None });
                self.event_sink
                    .emit(&ctx.session_id, &ctx.trace_id, now_ms(), GraphEvent::AgentNode { node_id: current.clone(), ok: false })
                    .await;
                match self.recover(&current, reason.clone(), &mut state, &mut trace, ctx).await {
                    Some(outcome) => return Ok(outcome),
                    None => {
                        return Err(GraphError::PreconditionFailed { node_id: current, reason });
                    }
                }
            }

            let output = match node.execute(&state, ctx).await {
                Ok(output) => output,
                Err(reason) => {
                    trace.push(GraphStep { node_id: current.clone(), outcome: StepOutcome::ExecutionFailed(reason.clone()), output: None });
                    self.event_sink
                        .emit(&ctx.session_id, &ctx.trace_id, now_ms(), GraphEvent::AgentNode { node_id: current.clone(), ok: false })
                        .await;
                    match self.recover(&current, reason.clone(), &mut state, &mut trace, ctx).await {
                        Some(outcome) => return Ok(outcome),
                        None => return Err(GraphError::ExecutionFailed { node_id: current, reason }),
                    }
                }
            };

            if let Err(reason) = node.postconditions(&state, &output) {
                trace.push(GraphStep { node_id: current.clone(), outcome: StepOutcome::PostconditionFailed(reason.clone()), output: Some(output) });
                self.event_sink
                    .emit(&ctx.session_id, &ctx.trace_id, now_ms(), GraphEvent::AgentNode { node_id: current.clone(), ok: false })
                    .await;
                match self.recover(&current, reason.clone(), &mut state, &mut trace, ctx).await {
                    Some(outcome) => return Ok(outcome),
                    None => return Err(GraphError::PostconditionFailed { node_id: current, reason }),
                }
            }

            state = node.update_state(state, &output);
            trace.push(GraphStep { node_id: current.clone(), outcome: StepOutcome::Ok, output: Some(output) });
            self.event_sink
                .emit(&ctx.session_id, &ctx.trace_id, now_ms(), GraphEvent::AgentNode { node_id: current.clone(), ok: true })
                .await;

            match self.next_node(&current, &state)? {
                EdgeTarget::End => {
                    return Ok(GraphOutcome { final_state: state, trace, status: GraphStatus::Completed });
                }
                EdgeTarget::Node(next) => current = next,
            }
        }
    }

    /// A fatal step just happened at `failed_node`; if a `failure_handler`
    /// is configured, run it once (its own failure is not recoverable
    /// again — `spec.md` §4.7 doesn't describe a recursive failure chain)
    /// and report the walk as `Completed` via the handler's own routing,
    /// or `Failed` if the handler itself can't finish.
    async fn recover(
        &self,
        failed_node: &str,
        reason: String,
        state: &mut S,
        trace: &mut Vec<GraphStep>,
        ctx: &GraphContext,
    ) -> Option<GraphOutcome<S>>
    where
        S: Clone,
    {
        let handler_id = self.failure_handler.as_ref()?;
        let handler = self.nodes.get(handler_id)?;

        tracing::warn!(node_id = failed_node, handler = %handler_id, %reason, "graph node failed fatally, routing to failure handler");

        self.event_sink
            .emit(
                &ctx.session_id,
                &ctx.trace_id,
                now_ms(),
                GraphEvent::AgentError { node_id: Some(failed_node.to_string()), message: reason.clone() },
            )
            .await;

        match handler.execute(state, ctx).await {
            Ok(output) => {
                let new_state = handler.update_state(state.clone(), &output);
                trace.push(GraphStep { node_id: handler_id.clone(), outcome: StepOutcome::Ok, output: Some(output) });
                Some(GraphOutcome { final_state: new_state, trace: trace.clone(), status: GraphStatus::Completed })
            }
            Err(handler_reason) => {
                trace.push(GraphStep {
                    node_id: handler_id.clone(),
                    outcome: StepOutcome::ExecutionFailed(handler_reason),
                    output: None,
                });
                Some(GraphOutcome { final_state: state.clone(), trace: trace.clone(), status: GraphStatus::Failed })
            }
        }
    }
}

/// Builds a [`ScenarioGraph`] out of nodes and edges.
pub struct ScenarioGraphBuilder<S> {
    entry_point: String,
    nodes: HashMap<String, Arc<dyn GraphNode<S>>>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge<S>>,
    failure_handler: Option<String>,
    event_sink: Arc<dyn GraphEventSink>,
}

impl<S: Send + Sync> ScenarioGraphBuilder<S> {
    /// Start building a graph whose walk begins at `entry_point`.
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: Vec::new(),
            failure_handler: None,
            event_sink: Arc::new(NullGraphEventSink),
        }
    }

    /// Register a node. Later registrations under the same id replace
    /// earlier ones.
    pub fn node(mut self, node: Arc<dyn GraphNode<S>>) -> Self {
        self.nodes.insert(node.id().to_string(), node);
        self
    }

    /// Add an unconditional `from → to` edge.
    pub fn edge(mut self, from: impl Into<String>, to: EdgeTarget) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Add a conditional edge. Conditional edges are consulted before plain
    /// edges for the same `from` node, per `spec.md` §4.7.
    pub fn conditional_edge(mut self, edge: ConditionalEdge<S>) -> Self {
        self.conditional_edges.push(edge);
        self
    }

    /// Set the node a fatal precondition/execution/postcondition failure
    /// routes to, instead of failing the walk outright.
    pub fn failure_handler(mut self, node_id: impl Into<String>) -> Self {
        self.failure_handler = Some(node_id.into());
        self
    }

    /// Observe `agent.start`/`agent.node`/`agent.error` events as the graph
    /// walks.
    pub fn event_sink(mut self, sink: Arc<dyn GraphEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Finish building. Does not validate that every edge target and
    /// conditional-edge route names a registered node — [`GraphError`]
    /// surfaces that at walk time instead, matching the spec's framing of
    /// these as walk-time failures rather than build-time ones.
    pub fn build(self) -> ScenarioGraph<S> {
        ScenarioGraph {
            entry_point: self.entry_point,
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
            failure_handler: self.failure_handler,
            event_sink: self.event_sink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use helm_proto::{SessionId, TraceId};
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct CounterState {
        count: u32,
        halted_on: Option<String>,
    }

    struct Increment {
        id: &'static str,
    }

    #[async_trait]
    impl GraphNode<CounterState> for Increment {
        fn id(&self) -> &str {
            self.id
        }

        async fn execute(&self, state: &CounterState, _ctx: &GraphContext) -> Result<Value, String> {
            Ok(json!({ "next": state.count + 1 }))
        }

        fn update_state(&self, state: CounterState, output: &Value) -> CounterState {
            CounterState { count: output["next"].as_u64().unwrap() as u32, ..state }
        }
    }

    struct RejectsAboveThree {
        id: &'static str,
    }

    #[async_trait]
    impl GraphNode<CounterState> for RejectsAboveThree {
        fn id(&self) -> &str {
            self.id
        }

        fn preconditions(&self, state: &CounterState) -> Result<(), String> {
            if state.count > 3 {
                Err(format!("count {} exceeds 3", state.count))
            } else {
                Ok(())
            }
        }

        async fn execute(&self, state: &CounterState, _ctx: &GraphContext) -> Result<Value, String> {
            Ok(json!({ "next": state.count + 1 }))
        }

        fn update_state(&self, state: CounterState, output: &Value) -> CounterState {
            CounterState { count: output["next"].as_u64().unwrap() as u32, ..state }
        }
    }

    struct FailureHandler {
        id: &'static str,
    }

    #[async_trait]
    impl GraphNode<CounterState> for FailureHandler {
        fn id(&self) -> &str {
            self.id
        }

        async fn execute(&self, _state: &CounterState, _ctx: &GraphContext) -> Result<Value, String> {
            Ok(json!({ "handled": true }))
        }

        fn update_state(&self, state: CounterState, _output: &Value) -> CounterState {
            CounterState { halted_on: Some("recovered".to_string()), ..state }
        }
    }

    fn ctx() -> GraphContext {
        GraphContext::new(SessionId::new("sess_1"), TraceId::new("trace_1"))
    }

    #[tokio::test]
    async fn walks_linear_graph_to_end() {
        let graph = ScenarioGraphBuilder::<CounterState>::new("a")
            .node(Arc::new(Increment { id: "a" }))
            .node(Arc::new(Increment { id: "b" }))
            .edge("a", EdgeTarget::Node("b".to_string()))
            .edge("b", EdgeTarget::End)
            .build();

        let outcome = graph.execute(CounterState::default(), &ctx()).await.unwrap();
        assert_eq!(outcome.status, GraphStatus::Completed);
        assert_eq!(outcome.final_state.count, 2);
        assert_eq!(outcome.trace.len(), 2);
        assert_eq!(outcome.trace[0].node_id, "a");
        assert_eq!(outcome.trace[1].node_id, "b");
    }

    #[tokio::test]
    async fn conditional_edge_is_consulted_before_plain_edge() {
        let mut routes = HashMap::new();
        routes.insert("high".to_string(), EdgeTarget::End);
        routes.insert("low".to_string(), EdgeTarget::Node("b".to_string()));

        let graph = ScenarioGraphBuilder::<CounterState>::new("a")
            .node(Arc::new(Increment { id: "a" }))
            .node(Arc::new(Increment { id: "b" }))
            .edge("a", EdgeTarget::Node("b".to_string()))
            .conditional_edge(ConditionalEdge::new(
                "a",
                |state: &CounterState| if state.count >= 1 { "high".to_string() } else { "low".to_string() },
                routes,
            ))
            .edge("b", EdgeTarget::End)
            .build();

        let outcome = graph.execute(CounterState::default(), &ctx()).await.unwrap();
        assert_eq!(outcome.final_state.count, 1, "conditional edge should route straight to END, skipping node b");
        assert_eq!(outcome.trace.len(), 1);
    }

    #[tokio::test]
    async fn fatal_precondition_routes_to_failure_handler() {
        let graph = ScenarioGraphBuilder::<CounterState>::new("a")
            .node(Arc::new(RejectsAboveThree { id: "a" }))
            .node(Arc::new(FailureHandler { id: "recover" }))
            .failure_handler("recover")
            .build();

        let outcome = graph.execute(CounterState { count: 5, halted_on: None }, &ctx()).await.unwrap();
        assert_eq!(outcome.status, GraphStatus::Completed);
        assert_eq!(outcome.final_state.halted_on.as_deref(), Some("recovered"));
        assert!(matches!(outcome.trace[0].outcome, StepOutcome::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn fatal_precondition_without_handler_fails_walk() {
        let graph = ScenarioGraphBuilder::<CounterState>::new("a").node(Arc::new(RejectsAboveThree { id: "a" })).build();

        let result = graph.execute(CounterState { count: 5, halted_on: None }, &ctx()).await;
        assert!(matches!(result, Err(GraphError::PreconditionFailed { .. })));
    }
}

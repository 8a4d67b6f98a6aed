//! Edges between graph nodes.

use std::collections::HashMap;

/// Where an edge points: another node, or the graph's terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    /// Continue at the named node.
    Node(String),
    /// Terminate the walk.
    End,
}

/// An unconditional `from → to` edge.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) from: String,
    pub(crate) to: EdgeTarget,
}

impl Edge {
    /// A plain edge from `from` to `to`.
    pub fn new(from: impl Into<String>, to: EdgeTarget) -> Self {
        Self { from: from.into(), to }
    }
}

/// A `from` node whose successor is chosen by evaluating `condition(state)`
/// against a route-key table, rather than a single fixed target.
pub struct ConditionalEdge<S> {
    pub(crate) from: String,
    pub(crate) condition: Box<dyn Fn(&S) -> String + Send + Sync>,
    pub(crate) routes: HashMap<String, EdgeTarget>,
}

impl<S> ConditionalEdge<S> {
    /// Build a conditional edge out of `from`, keyed by `condition`'s return
    /// value against `routes`. A route key with no entry in `routes` is a
    /// build-time error the caller should catch before running the graph —
    /// [`crate::graph::ScenarioGraph::execute`] treats it as a fatal
    /// [`crate::graph::GraphError::UnknownRoute`].
    pub fn new(
        from: impl Into<String>,
        condition: impl Fn(&S) -> String + Send + Sync + 'static,
        routes: HashMap<String, EdgeTarget>,
    ) -> Self {
        Self { from: from.into(), condition: Box::new(condition), routes }
    }
}

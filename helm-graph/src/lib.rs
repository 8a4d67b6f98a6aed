//! # helm-graph — Scenario Graph Engine
//!
//! A generic node/edge graph executor (`spec.md` §4.7), independent of the
//! Agent Turn Orchestrator's own loop (`helm-turn`). Research workflows
//! (`helm-research`) are built as graphs over this engine; nothing here
//! knows about papers, providers, or transcripts.
//!
//! Grounded on `neuron-orch-kit::runner::OrchestratedRunner` for the
//! runner shape — loop a current item, interpret the outcome, record a
//! trace, repeat until the queue (here: the walk) is done.

#![deny(missing_docs)]

pub mod edge;
pub mod event;
pub mod graph;
pub mod node;

pub use edge::{ConditionalEdge, Edge, EdgeTarget};
pub use event::{GraphEvent, GraphEventSink, NullGraphEventSink, RecordingGraphEventSink};
pub use graph::{GraphError, GraphOutcome, GraphStatus, GraphStep, ScenarioGraph, ScenarioGraphBuilder, StepOutcome};
pub use node::{GraphContext, GraphNode};

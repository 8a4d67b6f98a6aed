//! # helm-tool — Tool Executor Adapter, Registry, and Gate
//!
//! Implements `spec.md` §4.1 (Tool Executor Adapter) and §4.2 (Tool
//! Registry & Gate): a uniform `execute(name, params) -> outcome`
//! contract with schema validation and per-tool timeouts, a name→tool
//! registry that projects to model-facing function schemas, and a quota
//! gate the turn loop consults before invoking a search-class tool too
//! many times.
//!
//! Grounded on the teacher's `neuron-tool` crate: [`ToolDyn`] is the same
//! object-safe, manually-boxed-future shape (kept deliberately free of
//! `async-trait` here, matching the teacher, since this is the one trait
//! in the workspace that needs to stay dyn-compatible without the macro's
//! overhead in a hot per-step path); [`middleware`] is the same
//! `Next`-chain pattern generalized from WASM compatibility to the
//! composable tool-wrapping `spec.md` §4.1 describes in prose.

#![deny(missing_docs)]

pub mod descriptor;
pub mod executor;
pub mod gate;
pub mod middleware;
pub mod registry;

pub use descriptor::{Artifact, ExecuteOutcome, ToolDescriptor};
pub use executor::{ProgressHandler, ToolExecutor};
pub use gate::{GateConfig, GateDecision, ToolGate};
pub use middleware::{Next, ToolCall, ToolMiddleware};
pub use registry::{ToolDyn, ToolRegistry};

pub use helm_proto::ToolError;

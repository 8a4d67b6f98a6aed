//! # helm-turn — Agent Turn Orchestrator
//!
//! The assembly point for one agent turn: the Turn Loop Controller
//! (`spec.md` §4.5) drives a bounded sequence of model calls and tool
//! executions over the collaborators defined in `helm-proto`, `helm-types`,
//! `helm-tool`, `helm-task`, `helm-reasoning`, and `helm-state`, emitting
//! the outbound event contract (`spec.md` §6) as it goes. Two smaller
//! pieces ride alongside it: Computer Timeline Capture (§4.6), a
//! pass-through event-sink wrapper, and the Transcript Follow-up Router
//! (§4.9), which runs before a turn's first model call.
//!
//! Grounded on `neuron-op-react::ReactOperator<P>` for the loop's overall
//! shape — a struct generic over a model-client trait, built once per
//! turn over its collaborators, with one public entry point.

#![deny(missing_docs)]

pub mod config;
pub mod event;
pub mod router;
pub mod timeline;
pub mod turn;

pub use config::OrchestratorConfig;
pub use event::{EventSink, FinishReason, HelmEvent, RecordingEventSink};
pub use timeline::{ComputerTimelineStep, TimelineCapture};
pub use turn::{finalize_turn, TranscriptQa, TurnLoop, TurnOutcome};

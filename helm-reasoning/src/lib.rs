//! # helm-reasoning — Reasoning Event State Machine (`spec.md` §4.4)
//!
//! The hardest single piece of the core: a strictly-ordered, at-most-one-
//! running-step state machine that consumes [`ReasoningEvent`]s (possibly
//! delivered out of order, possibly duplicated) and emits a trace
//! subscribers can rely on to show exactly one running step at a time,
//! in strictly increasing step-index order, with no FINISHED step ever
//! mutated afterward.
//!
//! No teacher file implements this directly — `layer0::hook`'s strict
//! ordered-dispatch discipline (one hook point resolved at a time, in
//! declared order) is the closest grounding for "serialize concurrent
//! notions of progress into one observable sequence," generalized here
//! into a dedicated dedupe/reorder/drain machine per `spec.md` §4.4's
//! five numbered transition rules.

#![deny(missing_docs)]

pub mod sm;
pub mod types;

pub use sm::ReasoningStateMachine;
pub use types::{
    FinalStatus, Lifecycle, ReasoningEvent, ReasoningStep, StepDetails, StepStatus, TimestampMs,
};

//! # helm-proto — foundational protocol types for the helm agent turn orchestrator
//!
//! This crate carries the vocabulary every other `helm-*` crate builds on:
//! typed identifiers, a stable duration wire format, the universal content
//! representation that crosses the model/tool boundary, the shared error
//! taxonomy, and the observability hook seam used by the turn loop.
//!
//! Nothing here knows about models, tools, sessions, or reasoning traces —
//! those are `helm-types`, `helm-tool`, `helm-state`, and `helm-reasoning`
//! concerns. This crate only defines the shapes they agree on.

#![deny(missing_docs)]

pub mod content;
pub mod duration;
pub mod error;
pub mod hook;
pub mod id;

pub use content::{Content, ContentBlock, ImageSource};
pub use duration::DurationMs;
pub use error::{HookError, ToolError, TurnError};
pub use hook::{ObservabilityHook, HookAction, HookContext, HookPoint};
pub use id::{MessageId, SessionId, StepId, ToolCallId, TraceId};

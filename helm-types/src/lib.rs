//! # helm-types — wire types and the model provider contract
//!
//! The orchestrator never calls a model directly (see `spec.md` §1's
//! non-goals); it calls whatever implements [`Provider`]. This crate is
//! the lingua franca that sits between `helm-turn` and a provider
//! implementation — messages, tool schemas, and the streaming response
//! shape — plus the [`Message`] type persisted by the `helm-state`
//! collaborator.

#![deny(missing_docs)]

pub mod message;
pub mod provider;
pub mod stream;

pub use message::{Message, Role};
pub use provider::{Provider, ProviderError, ProviderRequest, ProviderResponse, StopReason, TokenUsage, ToolSchema};
pub use stream::StreamChunk;

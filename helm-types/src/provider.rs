//! The model client contract.
//!
//! `spec.md` §1 names the model client an external collaborator with
//! "bidirectional streaming of text + tool-call requests." [`Provider`]
//! is that contract. It is intentionally NOT object-safe (RPITIT) — the
//! turn loop is generic over `P: Provider`, matching the teacher's split
//! between a non-object-safe `Provider` and an object-safe outer
//! boundary (`helm-proto`'s traits are the object-safe ones in this
//! workspace).

use std::future::Future;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// JSON Schema description of a tool, as sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's input object.
    pub input_schema: Value,
}

/// Request sent to a provider for one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Model identifier, or `None` for the provider's default.
    pub model: Option<String>,
    /// Full conversation so far, including the system message.
    pub messages: Vec<Message>,
    /// Tools available this call, already filtered by the enabled-name set.
    pub tools: Vec<ToolSchema>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Provider-specific passthrough (caching hints, thinking budgets).
    #[serde(default)]
    pub extra: Value,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A complete final response with no further tool calls.
    EndTurn,
    /// The model wants to invoke one or more tools.
    ToolUse,
    /// Hit `max_tokens` before finishing.
    MaxTokens,
    /// Content was filtered by the provider's safety system.
    ContentFilter,
}

/// Token accounting for a single provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Tokens served from a prompt cache, if the provider supports one.
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to a prompt cache, if the provider supports one.
    pub cache_creation_tokens: Option<u64>,
}

/// The full (non-streaming) response to a [`ProviderRequest`].
///
/// `helm-turn` consumes a provider through streamed [`crate::StreamChunk`]s
/// in practice, but tests and simple providers can produce this directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The assistant message produced.
    pub message: Message,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token accounting.
    pub usage: TokenUsage,
    /// Model actually used (may differ from the request's hint).
    pub model: String,
    /// Cost computed by the provider, if it reports one.
    pub cost: Option<Decimal>,
}

/// Errors a provider can report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Transport-level failure (HTTP, network).
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,
    /// Authentication or authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),
    /// Response could not be parsed into a [`ProviderResponse`].
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Catch-all, preserved via `?`.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether a caller's retry policy might succeed on retry. The turn
    /// loop itself never retries (`spec.md` §1 non-goals) — this is for
    /// the caller's own retry layer, if any.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::RequestFailed(_))
    }
}

/// A streaming model client.
///
/// Not object-safe by design (return-position `impl Trait`); `helm-turn`'s
/// loop is generic over `P: Provider` rather than storing a `dyn Provider`.
pub trait Provider: Send + Sync {
    /// The chunk stream type returned by [`Provider::stream`].
    type Stream: futures::Stream<Item = Result<crate::stream::StreamChunk, ProviderError>> + Send;

    /// Send a request and get back a stream of chunks (text deltas and
    /// accumulating tool-call fragments), terminated by the final
    /// stop reason being known.
    fn stream(&self, request: ProviderRequest) -> impl Future<Output = Result<Self::Stream, ProviderError>> + Send;

    /// Non-streaming convenience: send a request and wait for the full
    /// response. The default implementation is for providers/tests that
    /// don't need incremental chunks; `helm-turn` always uses `stream`.
    fn complete(&self, request: ProviderRequest) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display() {
        assert_eq!(ProviderError::RateLimited.to_string(), "rate limited");
        assert_eq!(
            ProviderError::AuthFailed("bad key".into()).to_string(),
            "auth failed: bad key"
        );
    }

    #[test]
    fn provider_error_retryable() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::RequestFailed("timeout".into()).is_retryable());
        assert!(!ProviderError::AuthFailed("x".into()).is_retryable());
    }
}

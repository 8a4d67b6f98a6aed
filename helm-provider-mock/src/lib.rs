//! # helm-provider-mock — a scriptable [`Provider`] test double.
//!
//! `spec.md` §1 names the model client an external collaborator `helm-turn`
//! is generic over, never a concrete HTTP client the core depends on.
//! Grounded on `agent-types/tests/provider_trait.rs`'s `MockProvider`
//! (a fixed canned response implementing the real `Provider` trait
//! directly, no HTTP), extended into a FIFO queue of scripted
//! [`ScriptedTurn`]s so a single mock can drive a multi-step tool-call
//! conversation across an entire `helm-turn` test.

#![deny(missing_docs)]

use std::pin::Pin;
use std::sync::Mutex;

use futures::stream;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use helm_proto::ToolCallId;
use helm_types::message::{Message, Role};
use helm_types::provider::{Provider, ProviderError, ProviderRequest, ProviderResponse, StopReason, TokenUsage};
use helm_types::stream::StreamChunk;

/// One scripted model response, expressed the way the mock will stream it.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// A plain text response; terminates the turn with `StopReason::EndTurn`.
    Text(String),
    /// A tool-call response; terminates with `StopReason::ToolUse`. Each
    /// entry is `(tool_name, arguments)`; ids are assigned sequentially as
    /// `call_1`, `call_2`, ...
    ToolCalls(Vec<(String, Value)>),
    /// A transport-level failure.
    Error(ProviderError),
}

/// Records every request the mock received, so tests can assert on what
/// the turn loop actually sent (system prompt content, tool schemas,
/// message history) without a real network boundary in the way.
#[derive(Debug, Default)]
pub struct RequestLog {
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RequestLog {
    /// Snapshot of every request recorded so far, in arrival order.
    pub fn all(&self) -> Vec<ProviderRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    /// How many requests have been recorded.
    pub fn len(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }

    /// Whether no requests have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Provider`] that plays back a fixed script of [`ScriptedTurn`]s,
/// one per call, looping the final entry if the script is exhausted
/// (so a turn that runs one step longer than scripted doesn't panic —
/// it just repeats the last scripted behavior).
pub struct MockProvider {
    script: AsyncMutex<Vec<ScriptedTurn>>,
    next_call_id: Mutex<u64>,
    model_name: String,
    log: RequestLog,
}

impl MockProvider {
    /// Build a mock that plays back `script` in order.
    pub fn new(script: Vec<ScriptedTurn>) -> Self {
        Self {
            script: AsyncMutex::new(script),
            next_call_id: Mutex::new(0),
            model_name: "mock-1".to_string(),
            log: RequestLog::default(),
        }
    }

    /// A mock that always answers with the same plain text, forever.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedTurn::Text(text.into())])
    }

    /// Every request this mock has observed, for assertions.
    pub fn requests(&self) -> &RequestLog {
        &self.log
    }

    fn next_turn(&self) -> ScriptedTurn {
        let mut script = self.script.try_lock().expect("mock provider accessed concurrently");
        if script.len() > 1 {
            script.remove(0)
        } else {
            script.last().cloned().unwrap_or_else(|| ScriptedTurn::Text(String::new()))
        }
    }

    fn assign_call_id(&self) -> ToolCallId {
        let mut next = self.next_call_id.lock().expect("lock poisoned");
        *next += 1;
        ToolCallId::new(format!("call_{next}"))
    }

    fn respond(&self, turn: ScriptedTurn) -> Result<ProviderResponse, ProviderError> {
        match turn {
            ScriptedTurn::Text(text) => Ok(ProviderResponse {
                message: Message::assistant(text),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
                model: self.model_name.clone(),
                cost: None,
            }),
            ScriptedTurn::ToolCalls(calls) => {
                let requests = calls
                    .into_iter()
                    .map(|(name, arguments)| helm_types::message::ToolCallRequest {
                        id: self.assign_call_id(),
                        name,
                        arguments,
                    })
                    .collect();
                Ok(ProviderResponse {
                    message: Message {
                        role: Role::Assistant,
                        content: helm_proto::Content::Text(String::new()),
                        tool_calls: Some(requests),
                        tool_call_id: None,
                    },
                    stop_reason: StopReason::ToolUse,
                    usage: TokenUsage::default(),
                    model: self.model_name.clone(),
                    cost: None,
                })
            }
            ScriptedTurn::Error(err) => Err(err),
        }
    }
}

/// Boxed stream of chunks, since the mock's stream has no concrete type
/// worth naming in a public associated type.
pub type MockStream = Pin<Box<dyn futures::Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

impl Provider for MockProvider {
    type Stream = MockStream;

    async fn stream(&self, request: ProviderRequest) -> Result<Self::Stream, ProviderError> {
        self.log.requests.lock().expect("lock poisoned").push(request);

        let turn = self.next_turn();
        let response = self.respond(turn)?;

        let mut chunks = Vec::new();
        match &response.message.content {
            helm_proto::Content::Text(text) if !text.is_empty() => {
                chunks.push(Ok(StreamChunk::Content { delta: text.clone() }));
            }
            _ => {}
        }
        if let Some(tool_calls) = &response.message.tool_calls {
            for call in tool_calls {
                chunks.push(Ok(StreamChunk::ToolCallDelta {
                    id: call.id.clone(),
                    name: Some(call.name.clone()),
                    arguments_delta: call.arguments.to_string(),
                }));
            }
        }
        chunks.push(Ok(StreamChunk::Done {
            stop_reason: response.stop_reason,
            usage: response.usage,
            model: response.model,
        }));

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.log.requests.lock().expect("lock poisoned").push(request);
        let turn = self.next_turn();
        self.respond(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use helm_types::message::Message;

    fn request(text: &str) -> ProviderRequest {
        ProviderRequest {
            model: None,
            messages: vec![Message::user(text)],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            extra: Value::Null,
        }
    }

    #[tokio::test]
    async fn text_script_completes_with_end_turn() {
        let provider = MockProvider::always_text("hello");
        let response = provider.complete(request("hi")).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.message.content.as_text_lossy(), "hello");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn tool_call_script_assigns_sequential_ids() {
        let provider = MockProvider::new(vec![ScriptedTurn::ToolCalls(vec![
            ("web_search".to_string(), serde_json::json!({"q": "rust"})),
        ])]);
        let response = provider.complete(request("search")).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let calls = response.message.tool_calls.unwrap();
        assert_eq!(calls[0].id, ToolCallId::new("call_1"));
    }

    #[tokio::test]
    async fn script_repeats_final_entry_once_exhausted() {
        let provider = MockProvider::new(vec![ScriptedTurn::Text("only".to_string())]);
        provider.complete(request("a")).await.unwrap();
        let second = provider.complete(request("b")).await.unwrap();
        assert_eq!(second.message.content.as_text_lossy(), "only");
    }

    #[tokio::test]
    async fn stream_emits_content_then_done() {
        let provider = MockProvider::always_text("abc");
        let mut stream = provider.stream(request("hi")).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamChunk::Content { .. }));
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, StreamChunk::Done { .. }));
    }

    #[tokio::test]
    async fn scripted_error_is_returned() {
        let provider = MockProvider::new(vec![ScriptedTurn::Error(ProviderError::RateLimited)]);
        let err = provider.complete(request("a")).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }
}

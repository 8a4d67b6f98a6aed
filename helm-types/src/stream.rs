//! Chunk types for a streaming model call.
//!
//! `spec.md` §4.5 distinguishes two kinds of chunk the turn loop consumes:
//! content (appended to the step's draft text) and tool_call (accumulated
//! per request id, since a provider streams a tool call's JSON arguments
//! piece by piece rather than all at once).

use serde::{Deserialize, Serialize};

use helm_proto::ToolCallId;

use crate::provider::{StopReason, TokenUsage};

/// One increment of a streamed provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamChunk {
    /// A fragment of assistant text to append to the current draft.
    Content {
        /// The text fragment.
        delta: String,
    },
    /// A fragment of a tool call's arguments.
    ///
    /// `name` is present on the first fragment for a given `id` and
    /// absent (empty string) on subsequent fragments; `arguments_delta`
    /// is concatenated across fragments and parsed as JSON once the
    /// stream reaches `stop_reason: ToolUse`.
    ToolCallDelta {
        /// Which tool call this fragment belongs to.
        id: ToolCallId,
        /// Tool name, present on the first fragment.
        name: Option<String>,
        /// Next slice of the accumulated JSON arguments string.
        arguments_delta: String,
    },
    /// Terminal chunk: the stream is done and will yield no more items.
    Done {
        /// Why generation stopped.
        stop_reason: StopReason,
        /// Token accounting for the whole call.
        usage: TokenUsage,
        /// Model actually used.
        model: String,
    },
}

/// Accumulates [`StreamChunk`]s into a draft text body and a set of
/// completed tool-call requests, in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: Vec<AccumulatingToolCall>,
}

#[derive(Debug)]
struct AccumulatingToolCall {
    id: ToolCallId,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    /// New, empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulator. Returns `true` if this chunk
    /// was the first content chunk seen (the turn loop uses this to
    /// transition the "planning" reasoning step into "Generating
    /// response").
    pub fn push(&mut self, chunk: &StreamChunk) -> bool {
        match chunk {
            StreamChunk::Content { delta } => {
                let was_first = self.text.is_empty() && self.tool_calls.is_empty();
                self.text.push_str(delta);
                was_first
            }
            StreamChunk::ToolCallDelta { id, name, arguments_delta } => {
                if let Some(existing) = self.tool_calls.iter_mut().find(|t| &t.id == id) {
                    existing.arguments.push_str(arguments_delta);
                } else {
                    self.tool_calls.push(AccumulatingToolCall {
                        id: id.clone(),
                        name: name.clone().unwrap_or_default(),
                        arguments: arguments_delta.clone(),
                    });
                }
                false
            }
            StreamChunk::Done { .. } => false,
        }
    }

    /// Whether any tool call fragments have arrived.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The draft text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finalize into `(text, parsed tool calls)`. Tool calls whose
    /// accumulated argument string fails to parse as JSON get `{}` per
    /// `spec.md` §4.5's "on parse failure, params={}" rule.
    pub fn finish(self) -> (String, Vec<crate::message::ToolCallRequest>) {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|t| crate::message::ToolCallRequest {
                id: t.id,
                name: t.name,
                arguments: serde_json::from_str(&t.arguments).unwrap_or(serde_json::json!({})),
            })
            .collect();
        (self.text, tool_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_content_chunk_is_flagged() {
        let mut acc = StreamAccumulator::new();
        assert!(acc.push(&StreamChunk::Content { delta: "hi".into() }));
        assert!(!acc.push(&StreamChunk::Content { delta: " there".into() }));
        assert_eq!(acc.text(), "hi there");
    }

    #[test]
    fn tool_call_arguments_accumulate_across_fragments() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamChunk::ToolCallDelta {
            id: ToolCallId::new("call_1"),
            name: Some("web_search".into()),
            arguments_delta: "{\"q\":".into(),
        });
        acc.push(&StreamChunk::ToolCallDelta {
            id: ToolCallId::new("call_1"),
            name: None,
            arguments_delta: "\"rust\"}".into(),
        });
        let (_, calls) = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arguments, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn unparseable_arguments_fall_back_to_empty_object() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamChunk::ToolCallDelta {
            id: ToolCallId::new("call_1"),
            name: Some("bad".into()),
            arguments_delta: "{not json".into(),
        });
        let (_, calls) = acc.finish();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }
}

//! The message shape shared by the working list, the provider wire
//! protocol, and the persistence contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use helm_proto::{Content, ToolCallId};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions, prepended once per turn.
    System,
    /// The end user.
    User,
    /// The model.
    Assistant,
    /// A tool result, answering a prior assistant tool-call request.
    Tool,
}

/// A single request, from the assistant, to invoke a named tool.
///
/// Carried on an [`Message`] with `role: Assistant` whenever the model's
/// response included one or more tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id assigned by the model; echoed back in the matching
    /// `role: Tool` message's `tool_call_id`.
    pub id: ToolCallId,
    /// Registered tool name.
    pub name: String,
    /// Arguments, already parsed from the model's accumulated JSON string.
    pub arguments: Value,
}

/// An ordered element of a session's conversation.
///
/// Immutable once persisted — the in-flight working set the turn loop
/// mutates is an ordered `Vec<Message>`, not a shared mutable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// Message body.
    pub content: Content,
    /// Present only on `role: Assistant` messages that requested tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Present only on `role: Tool` messages: which request this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
}

impl Message {
    /// Build a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::text(text),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Build a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Build a plain assistant message with no tool calls.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Build an assistant message carrying tool-call requests.
    pub fn assistant_tool_calls(content: Content, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Build a tool-result message answering `tool_call_id`.
    ///
    /// `payload` should already be the canonical
    /// `{success, output, error, artifacts, previewSnapshots}` JSON value
    /// described in the wire contract; this constructor stores it as the
    /// message's text body (serialized) so it flows straight back into
    /// the next provider request.
    pub fn tool_result(tool_call_id: ToolCallId, payload: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: Content::text(payload.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_format_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn tool_result_serializes_payload_into_content() {
        let payload = serde_json::json!({"success": true, "output": "42", "error": null});
        let msg = Message::tool_result(ToolCallId::new("call_1"), &payload);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id, Some(ToolCallId::new("call_1")));
    }
}

//! Content representation shared across model messages and tool results.
//!
//! A [`Message`](../helm_types/enum.Message.html) body is either plain text
//! or a list of [`ContentBlock`]s — the same shape a model sees a tool
//! call in and a tool result comes back in. Keeping this representation in
//! `helm-proto` (rather than duplicating it in `helm-types` and
//! `helm-tool`) is what lets a tool result block flow straight into the
//! next model request without a translation layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ToolCallId;

/// The body of a message: either a single text string or a sequence of
/// content blocks (text interleaved with tool use/results/images).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text body.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Construct a plain-text content body.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Flatten to a single string, concatenating text blocks and
    /// summarizing non-text blocks for logging/debugging purposes.
    pub fn as_text_lossy(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.clone(),
                    ContentBlock::ToolUse { name, .. } => format!("[tool_use:{name}]"),
                    ContentBlock::ToolResult { is_error, .. } => {
                        format!("[tool_result error={is_error}]")
                    }
                    ContentBlock::Image { .. } => "[image]".to_string(),
                    ContentBlock::Custom { kind, .. } => format!("[{kind}]"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// All tool-use blocks present in this content, in order.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match self {
            Content::Text(_) => Vec::new(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .collect(),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_owned())
    }
}

/// A single block within a structured message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// A model-issued request to invoke a tool.
    ToolUse {
        /// Correlates this request with its eventual [`ContentBlock::ToolResult`].
        id: ToolCallId,
        /// Tool name as registered in the tool registry.
        name: String,
        /// Arguments, opaque to the turn loop — validated only by the tool.
        input: Value,
    },
    /// The outcome of executing a tool call.
    ToolResult {
        /// The [`ToolCallId`] this result answers.
        tool_use_id: ToolCallId,
        /// Result payload — on success, the tool's output; on failure, an
        /// error description. Never both.
        content: Value,
        /// Whether execution failed. A failed tool call still produces a
        /// `ToolResult` block (never dropped silently) so the model can
        /// react to the failure.
        is_error: bool,
    },
    /// An image, inline or by reference.
    Image {
        /// Where the image bytes come from.
        source: ImageSource,
    },
    /// An extension block not covered by the above, identified by a
    /// free-form `kind` tag. Lets a caller thread through data the
    /// orchestrator itself doesn't interpret (e.g. video preview frames).
    Custom {
        /// Discriminator for the extension payload.
        kind: String,
        /// The extension payload itself.
        data: Value,
    },
}

/// Where an [`ContentBlock::Image`]'s bytes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded inline bytes with a media type.
    Base64 {
        /// E.g. `image/png`.
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
    /// A fetchable URL.
    Url {
        /// The image location.
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_round_trips() {
        let c = Content::text("hello");
        let json = serde_json::to_string(&c).unwrap();
        let back: Content = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn tool_uses_extracts_only_tool_use_blocks() {
        let c = Content::Blocks(vec![
            ContentBlock::Text { text: "thinking".into() },
            ContentBlock::ToolUse {
                id: ToolCallId::new("call_1"),
                name: "search_papers".into(),
                input: serde_json::json!({"query": "transformers"}),
            },
        ]);
        assert_eq!(c.tool_uses().len(), 1);
    }

    #[test]
    fn as_text_lossy_summarizes_non_text_blocks() {
        let c = Content::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: ToolCallId::new("call_1"),
            content: serde_json::json!({"ok": true}),
            is_error: false,
        }]);
        assert_eq!(c.as_text_lossy(), "[tool_result error=false]");
    }
}

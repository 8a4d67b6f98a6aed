//! Static facts about a registered tool, and the outcome shape every
//! execution produces.

use helm_proto::DurationMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name→descriptor entry: schema, timeout, and flags the Gate and Director
/// consult before admitting a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, matching a [`crate::ToolDyn::name`] implementation.
    pub name: String,
    /// Human-readable description sent to the model.
    pub description: String,
    /// JSON Schema for the tool's input object.
    pub input_schema: Value,
    /// Per-call execution budget; exceeding it fails with
    /// [`helm_proto::ToolError::TimedOut`].
    pub timeout: DurationMs,
    /// Whether a human must confirm before this call executes. The
    /// confirmation flow itself is a transport-layer concern — this flag
    /// only marks the tool for whatever UI surfaces the prompt.
    pub requires_confirmation: bool,
    /// Whether this tool performs external information retrieval
    /// (`web_search`, `paper_search`, …). Search-class tools are subject
    /// to the per-task quota in `helm-task` and the generic tag quota in
    /// [`crate::ToolGate`].
    pub is_search_class: bool,
}

/// A single produced artifact (file, image, document) from a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Display name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Assigned once the artifact has been persisted by the storage
    /// collaborator; `None` immediately after tool execution.
    pub file_id: Option<String>,
}

/// The uniform result of one [`crate::ToolExecutor::execute`] call.
///
/// Matches the wire contract in `spec.md` §6: `{success, output, error,
/// duration, artifacts, previewSnapshots}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// Text output (empty string on failure).
    pub output: String,
    /// Error message, only set when `success` is `false`.
    pub error: Option<String>,
    /// Wall-clock time spent in the tool, including validation.
    pub duration: DurationMs,
    /// Produced artifacts, if any.
    pub artifacts: Vec<Artifact>,
    /// Intermediate preview frames/snapshots emitted during execution
    /// (e.g. browser screenshots), collected for replay.
    pub preview_snapshots: Vec<Value>,
}

impl ExecuteOutcome {
    /// Build a successful outcome with no artifacts or previews.
    pub fn ok(output: impl Into<String>, duration: DurationMs) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration,
            artifacts: Vec::new(),
            preview_snapshots: Vec::new(),
        }
    }

    /// Build a failed outcome.
    pub fn failed(error: impl Into<String>, duration: DurationMs) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration,
            artifacts: Vec::new(),
            preview_snapshots: Vec::new(),
        }
    }

    /// The canonical JSON payload sent back to the model as a `role: tool`
    /// message's content (`spec.md` §6).
    pub fn to_tool_result_json(&self) -> Value {
        serde_json::json!({
            "success": self.success,
            "output": self.output,
            "error": self.error,
            "artifacts": self.artifacts,
            "previewSnapshots": self.preview_snapshots,
        })
    }
}

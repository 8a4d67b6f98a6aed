//! Persisted record shapes (`spec.md` §3).

use serde::{Deserialize, Serialize};

use helm_proto::{MessageId, SessionId};
use helm_tool::Artifact;
use helm_types::Message;

/// Whether a session is still addressable. Soft-deleted sessions are the
/// source of the foreign-key race `spec.md` §7/§8 scenario 6 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Normal, writable.
    Active,
    /// Soft-deleted; writes referencing it must fail with
    /// [`PersistenceError::ForeignKeyViolation`].
    Deleted,
}

/// Identity container a turn belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id.
    pub id: SessionId,
    /// Owning user id.
    pub owner_id: String,
    /// Workspace root path for this session's tool executions.
    pub workspace_path: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Epoch-millisecond timestamp of the last turn activity.
    pub last_active_at_ms: i64,
}

/// A persisted, immutable message with its assigned id and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    /// Assigned id.
    pub id: MessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// The message itself.
    pub message: Message,
    /// Epoch-millisecond creation time; messages are ordered by this.
    pub created_at_ms: i64,
}

/// Status of a [`ToolCallRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Recorded before the call resolved.
    Pending,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Persisted audit entry for one tool call.
///
/// Invariant (`spec.md` §3): every completed turn's tool calls end with
/// an `assistant_message_id` if the assistant message persisted
/// successfully — linked post-hoc via
/// [`crate::PersistenceStore::link_tool_calls_to_message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Owning session.
    pub session_id: SessionId,
    /// Tool name invoked.
    pub tool_name: String,
    /// Input parameters, opaque to the store.
    pub input: serde_json::Value,
    /// Whether the call succeeded, once known.
    pub success: Option<bool>,
    /// Output text, once known.
    pub output: Option<String>,
    /// Error message, once known.
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds, once known.
    pub duration_ms: Option<u64>,
    /// Produced artifacts, once known.
    pub artifacts: Vec<Artifact>,
    /// Lifecycle status.
    pub status: ToolCallStatus,
    /// Set once the owning assistant message has persisted.
    pub assistant_message_id: Option<MessageId>,
}

/// Errors the persistence collaborator can report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PersistenceError {
    /// The referenced session no longer exists (soft-deleted mid-turn).
    /// `spec.md` §7: detected by a distinguishable code and must be
    /// ignored on final assistant-message persistence.
    #[error("foreign key violation: session {0} no longer exists")]
    ForeignKeyViolation(SessionId),
    /// Catch-all, preserved via `?`.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

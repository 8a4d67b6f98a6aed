//! # helm-state — the persistence contract (`spec.md` §3, §6)
//!
//! `spec.md` §1 treats the message/tool-call store as an external
//! collaborator, not core logic. This crate defines that contract
//! ([`PersistenceStore`]) and ships one in-memory implementation for
//! tests — never a production database layer. Grounded on the teacher's
//! `neuron-state-memory`: a `RwLock<HashMap<_, _>>` behind an async
//! trait, scope-isolated by composite key.

#![deny(missing_docs)]

pub mod memory;
pub mod types;

pub use memory::MemoryPersistenceStore;
pub use types::{
    PersistenceError, PersistedMessage, SessionRecord, SessionStatus, ToolCallRecord,
    ToolCallStatus,
};

use async_trait::async_trait;

use helm_proto::{MessageId, SessionId, ToolCallId};
use helm_types::Message;

/// The persistence collaborator `helm-turn` writes through and reads
/// history from.
///
/// `spec.md` §7: a foreign-key violation on final persistence (session
/// deleted mid-turn) is a distinguished error variant, not a generic
/// failure — callers match on [`PersistenceError::ForeignKeyViolation`]
/// and swallow it rather than surfacing it to the client.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Append an immutable message to a session's ordered history.
    async fn append_message(&self, session_id: &SessionId, message: Message, now_ms: i64) -> Result<MessageId, PersistenceError>;

    /// All messages for a session, ordered by `createdAt`.
    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<PersistedMessage>, PersistenceError>;

    /// Persist a tool-call audit record.
    async fn record_tool_call(&self, record: ToolCallRecord) -> Result<(), PersistenceError>;

    /// Link previously-pending tool-call records to the assistant message
    /// that now owns them. A no-op, not an error, when there is nothing
    /// pending to link.
    async fn link_tool_calls_to_message(&self, session_id: &SessionId, tool_call_ids: &[ToolCallId], message_id: &MessageId) -> Result<(), PersistenceError>;

    /// Update a session's last-active timestamp.
    async fn touch_session(&self, session_id: &SessionId, now_ms: i64) -> Result<(), PersistenceError>;

    /// Look up a session by id.
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, PersistenceError>;

    /// Most recent completed tool call of `tool_name`, optionally
    /// constrained to calls whose input carried `url` (used by
    /// `helm-turn`'s Transcript Follow-up Router, `spec.md` §4.9).
    async fn find_latest_completed_tool_call(&self, session_id: &SessionId, tool_name: &str, url: Option<&str>) -> Result<Option<ToolCallRecord>, PersistenceError>;
}

//! In-memory [`PersistenceStore`], for tests only.
//!
//! Grounded on the teacher's `neuron-state-memory::MemoryStore`: a single
//! `RwLock`-guarded map, isolated by a composite key built from the
//! caller-supplied scope plus an inner key. Here the "scope" is always a
//! session id and the inner keys are message/tool-call ids.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use helm_proto::{MessageId, SessionId, ToolCallId};
use helm_types::Message;

use crate::types::{
    PersistedMessage, PersistenceError, SessionRecord, SessionStatus, ToolCallRecord,
    ToolCallStatus,
};
use crate::PersistenceStore;

fn composite_key(session_id: &SessionId, key: &str) -> String {
    format!("{}\0{}", session_id.as_str(), key)
}

struct Inner {
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, Vec<PersistedMessage>>,
    tool_calls: HashMap<String, Vec<ToolCallRecord>>,
    next_message_seq: u64,
}

/// In-memory test double for [`PersistenceStore`].
///
/// Sessions start `Active`. Call [`Self::delete_session`] to simulate the
/// mid-turn deletion race `spec.md` §8 scenario 6 exercises: any write
/// touching a deleted session's id returns
/// [`PersistenceError::ForeignKeyViolation`] instead of succeeding, while
/// reads still return `None`/empty rather than erroring.
pub struct MemoryPersistenceStore {
    inner: RwLock<Inner>,
}

impl MemoryPersistenceStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                sessions: HashMap::new(),
                messages: HashMap::new(),
                tool_calls: HashMap::new(),
                next_message_seq: 0,
            }),
        }
    }

    /// Register a session as active and writable.
    pub fn create_session(&self, record: SessionRecord) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.sessions.insert(record.id.as_str().to_string(), record);
    }

    /// Mark a session deleted. Existing history remains readable; further
    /// writes against it fail with [`PersistenceError::ForeignKeyViolation`].
    pub fn delete_session(&self, session_id: &SessionId) {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(record) = inner.sessions.get_mut(session_id.as_str()) {
            record.status = SessionStatus::Deleted;
        }
    }

    fn ensure_writable(inner: &Inner, session_id: &SessionId) -> Result<(), PersistenceError> {
        match inner.sessions.get(session_id.as_str()) {
            Some(record) if record.status == SessionStatus::Active => Ok(()),
            _ => Err(PersistenceError::ForeignKeyViolation(session_id.clone())),
        }
    }
}

impl Default for MemoryPersistenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceStore for MemoryPersistenceStore {
    async fn append_message(
        &self,
        session_id: &SessionId,
        message: Message,
        now_ms: i64,
    ) -> Result<MessageId, PersistenceError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::ensure_writable(&inner, session_id)?;

        inner.next_message_seq += 1;
        let id = MessageId::new(format!("msg_{}", inner.next_message_seq));
        let key = composite_key(session_id, "messages");
        inner.messages.entry(key).or_default().push(PersistedMessage {
            id: id.clone(),
            session_id: session_id.clone(),
            message,
            created_at_ms: now_ms,
        });
        Ok(id)
    }

    async fn list_messages(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<PersistedMessage>, PersistenceError> {
        let inner = self.inner.read().expect("lock poisoned");
        let key = composite_key(session_id, "messages");
        let mut messages = inner.messages.get(&key).cloned().unwrap_or_default();
        messages.sort_by_key(|m| m.created_at_ms);
        Ok(messages)
    }

    async fn record_tool_call(&self, record: ToolCallRecord) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::ensure_writable(&inner, &record.session_id)?;

        let key = composite_key(&record.session_id, "tool_calls");
        inner.tool_calls.entry(key).or_default().push(record);
        Ok(())
    }

    async fn link_tool_calls_to_message(
        &self,
        session_id: &SessionId,
        tool_call_ids: &[ToolCallId],
        message_id: &MessageId,
    ) -> Result<(), PersistenceError> {
        if tool_call_ids.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::ensure_writable(&inner, session_id)?;

        let key = composite_key(session_id, "tool_calls");
        if let Some(records) = inner.tool_calls.get_mut(&key) {
            // Tool calls don't carry their own id in this test double;
            // linking is positional by call order among those still
            // unlinked, mirroring the "updateMany" the spec describes.
            let mut remaining = tool_call_ids.len();
            for record in records.iter_mut().rev() {
                if remaining == 0 {
                    break;
                }
                if record.assistant_message_id.is_none() {
                    record.assistant_message_id = Some(message_id.clone());
                    remaining -= 1;
                }
            }
        }
        Ok(())
    }

    async fn touch_session(
        &self,
        session_id: &SessionId,
        now_ms: i64,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::ensure_writable(&inner, session_id)?;
        if let Some(record) = inner.sessions.get_mut(session_id.as_str()) {
            record.last_active_at_ms = now_ms;
        }
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.sessions.get(session_id.as_str()).cloned())
    }

    async fn find_latest_completed_tool_call(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        url: Option<&str>,
    ) -> Result<Option<ToolCallRecord>, PersistenceError> {
        let inner = self.inner.read().expect("lock poisoned");
        let key = composite_key(session_id, "tool_calls");
        let found = inner
            .tool_calls
            .get(&key)
            .into_iter()
            .flatten()
            .rev()
            .find(|record| {
                record.status == ToolCallStatus::Completed
                    && record.tool_name == tool_name
                    && url.is_none_or(|u| record.input.get("url").and_then(|v| v.as_str()) == Some(u))
            })
            .cloned();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::Message;
    use serde_json::json;

    fn active_session(id: &str) -> SessionRecord {
        SessionRecord {
            id: SessionId::new(id),
            owner_id: "user_1".to_string(),
            workspace_path: "/workspaces/s".to_string(),
            status: SessionStatus::Active,
            last_active_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn append_and_list_messages_round_trip() {
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        store.create_session(active_session("sess_1"));

        let id1 = store
            .append_message(&session_id, Message::user("hi"), 100)
            .await
            .unwrap();
        let id2 = store
            .append_message(&session_id, Message::assistant("hello"), 200)
            .await
            .unwrap();
        assert_ne!(id1, id2);

        let messages = store.list_messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].created_at_ms, 100);
        assert_eq!(messages[1].created_at_ms, 200);
    }

    #[tokio::test]
    async fn writes_against_deleted_session_raise_foreign_key_violation() {
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        store.create_session(active_session("sess_1"));
        store.delete_session(&session_id);

        let result = store.append_message(&session_id, Message::user("hi"), 100).await;
        assert!(matches!(result, Err(PersistenceError::ForeignKeyViolation(id)) if id == session_id));

        let touch = store.touch_session(&session_id, 100).await;
        assert!(touch.is_err());
    }

    #[tokio::test]
    async fn find_latest_completed_tool_call_filters_by_name_and_url() {
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        store.create_session(active_session("sess_1"));

        store
            .record_tool_call(ToolCallRecord {
                session_id: session_id.clone(),
                tool_name: "video_probe".to_string(),
                input: json!({"url": "https://youtu.be/abc"}),
                success: Some(true),
                output: Some("ok".to_string()),
                error: None,
                duration_ms: Some(10),
                artifacts: vec![],
                status: ToolCallStatus::Completed,
                assistant_message_id: None,
            })
            .await
            .unwrap();

        let found = store
            .find_latest_completed_tool_call(&session_id, "video_probe", Some("https://youtu.be/abc"))
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_latest_completed_tool_call(&session_id, "video_probe", Some("https://other"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn link_tool_calls_to_message_is_noop_on_empty_slice() {
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        store.create_session(active_session("sess_1"));
        store.delete_session(&session_id);

        // Even against a deleted session, an empty id slice must not error.
        let result = store
            .link_tool_calls_to_message(&session_id, &[], &MessageId::new("m1"))
            .await;
        assert!(result.is_ok());
    }
}

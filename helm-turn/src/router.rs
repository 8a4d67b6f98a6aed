//! Transcript Follow-up Router (`spec.md` §4.9).
//!
//! Classifies whether the user's latest message is a follow-up question
//! about a video transcript already extracted earlier in the session,
//! and if so, injects that transcript's output back into the working
//! message list as a synthetic tool-role message before the first model
//! call — so the model answers from the existing transcript rather than
//! re-running `video_transcript`.
//!
//! Grounded on `helm-task::goal`'s keyword-heuristic style for the
//! primary classification path; the model-classifier fallback mirrors
//! the teacher's pattern (seen in `neuron-op-react`) of a single
//! non-streaming `provider.complete` call for a narrow, JSON-only
//! sub-task, distinct from the turn's main streaming call.

use helm_proto::{SessionId, ToolCallId};
use helm_types::message::Message;
use helm_types::provider::{Provider, ProviderRequest};
use helm_types::ToolSchema;
use serde_json::Value;

use helm_state::PersistenceStore;

const FOLLOWUP_MARKERS: &[&str] = &[
    "transcript",
    "subtitle",
    "caption",
    "what did they say",
    "what was said",
    "what does he say",
    "what does she say",
    "resumen",
    "subtítulo",
    "字幕",
    "文字稿",
];

/// Rule-based classification: does `user_text` look like a follow-up
/// about a previously extracted transcript?
///
/// Keyword/regex-lite heuristic over a small multilingual cue list, per
/// `spec.md` §4.9's "regex over multilingual content/segment/summary
/// cues." Returns `false` on no match, in which case the caller may fall
/// back to [`classify_via_model`].
pub fn looks_like_transcript_followup(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    FOLLOWUP_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Fallback classification via a small JSON-only model call.
///
/// Sends a single non-streaming request asking the model to answer with
/// `{"useTranscriptContext": true|false}`; any response that doesn't
/// parse as that shape is treated as `false` (`spec.md` §7's parse-
/// failure policy: fall back to a low-confidence default).
pub async fn classify_via_model<P: Provider>(provider: &P, user_text: &str) -> bool {
    let request = ProviderRequest {
        model: None,
        messages: vec![
            Message::system(
                "Reply with exactly one JSON object: {\"useTranscriptContext\": true} or \
                 {\"useTranscriptContext\": false}. No other text.",
            ),
            Message::user(user_text),
        ],
        tools: Vec::<ToolSchema>::new(),
        max_tokens: Some(32),
        temperature: Some(0.0),
        extra: Value::Null,
    };

    let Ok(response) = provider.complete(request).await else {
        return false;
    };

    let text = response.message.content.as_text_lossy();
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .and_then(|v| v.get("useTranscriptContext").and_then(Value::as_bool))
        .unwrap_or(false)
}

/// If a completed `video_transcript` call exists for this session
/// (optionally scoped to `video_url`), append its output to `messages`
/// as a synthetic tool-role message and return `true`.
///
/// The synthetic message answers no real pending request, so it carries
/// a router-assigned [`ToolCallId`] rather than one the model issued.
pub async fn inject_transcript_context(
    store: &dyn PersistenceStore,
    session_id: &SessionId,
    video_url: Option<&str>,
    messages: &mut Vec<Message>,
) -> Result<bool, helm_state::PersistenceError> {
    let Some(record) = store.find_latest_completed_tool_call(session_id, "video_transcript", video_url).await? else {
        return Ok(false);
    };

    let payload = serde_json::json!({
        "success": record.success.unwrap_or(true),
        "output": record.output.clone().unwrap_or_default(),
        "error": record.error,
        "artifacts": record.artifacts,
        "previewSnapshots": Vec::<Value>::new(),
    });
    messages.push(Message::tool_result(ToolCallId::new("router_transcript_context"), &payload));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_transcript_question_is_recognized() {
        assert!(looks_like_transcript_followup("What does the transcript say about pricing?"));
    }

    #[test]
    fn unrelated_question_is_not_recognized() {
        assert!(!looks_like_transcript_followup("What's the weather like today?"));
    }

    #[tokio::test]
    async fn inject_transcript_context_appends_synthetic_tool_message() {
        use helm_state::{MemoryPersistenceStore, SessionRecord, SessionStatus, ToolCallRecord, ToolCallStatus};

        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        store.create_session(SessionRecord {
            id: session_id.clone(),
            owner_id: "user_1".to_string(),
            workspace_path: "/workspaces/s".to_string(),
            status: SessionStatus::Active,
            last_active_at_ms: 0,
        });
        store
            .record_tool_call(ToolCallRecord {
                session_id: session_id.clone(),
                tool_name: "video_transcript".to_string(),
                input: serde_json::json!({"url": "https://v.test"}),
                success: Some(true),
                output: Some("hello world".to_string()),
                error: None,
                duration_ms: Some(10),
                artifacts: vec![],
                status: ToolCallStatus::Completed,
                assistant_message_id: None,
            })
            .await
            .unwrap();

        let mut messages = vec![Message::user("what did they say?")];
        let injected = inject_transcript_context(&store, &session_id, Some("https://v.test"), &mut messages)
            .await
            .unwrap();
        assert!(injected);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.as_text_lossy().contains("hello world"));
    }

    #[tokio::test]
    async fn inject_transcript_context_is_noop_when_nothing_found() {
        use helm_state::MemoryPersistenceStore;

        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        let mut messages = vec![Message::user("hi")];
        let injected = inject_transcript_context(&store, &session_id, None, &mut messages).await.unwrap();
        assert!(!injected);
        assert_eq!(messages.len(), 1);
    }
}

//! Intent Parsing (`spec.md` §4.8): classify the user's request as
//! `research`, `ppt`, `summary`, or `general_chat` via a single JSON-only
//! model call.
//!
//! Grounded on `helm_turn::router::classify_via_model`'s pattern of a
//! narrow, non-streaming `provider.complete` call for a JSON-only
//! sub-task, applied here to a 4-way classification instead of a boolean.

use serde_json::Value;

use helm_types::message::Message;
use helm_types::provider::{Provider, ProviderRequest};
use helm_types::ToolSchema;

use crate::state::Intent;

/// Classify `request_text` into one of the four research intents.
///
/// On a parse failure — the model's reply isn't the expected JSON shape,
/// or the provider call itself errors — defaults to `GeneralChat` at
/// confidence `0.5`, per `spec.md` §4.8.
pub async fn parse_intent<P: Provider>(provider: &P, request_text: &str) -> (Intent, f64) {
    let request = ProviderRequest {
        model: None,
        messages: vec![
            Message::system(
                "Classify the user's request into exactly one of: research, ppt, summary, \
                 general_chat. Reply with exactly one JSON object: \
                 {\"intent\": \"research\"|\"ppt\"|\"summary\"|\"general_chat\", \"confidence\": 0.0-1.0}. \
                 No other text.",
            ),
            Message::user(request_text),
        ],
        tools: Vec::<ToolSchema>::new(),
        max_tokens: Some(64),
        temperature: Some(0.0),
        extra: Value::Null,
    };

    let Ok(response) = provider.complete(request).await else {
        return (Intent::GeneralChat, 0.5);
    };

    let text = response.message.content.as_text_lossy();
    let Some(parsed) = serde_json::from_str::<Value>(text.trim()).ok() else {
        return (Intent::GeneralChat, 0.5);
    };

    let intent = match parsed.get("intent").and_then(Value::as_str) {
        Some("research") => Intent::Research,
        Some("ppt") => Intent::Ppt,
        Some("summary") => Intent::Summary,
        Some("general_chat") => Intent::GeneralChat,
        _ => return (Intent::GeneralChat, 0.5),
    };
    let confidence = parsed.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);
    (intent, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_provider_mock::{MockProvider, ScriptedTurn};

    #[tokio::test]
    async fn parses_a_well_formed_classification() {
        let provider = MockProvider::new(vec![ScriptedTurn::Text(
            "{\"intent\": \"research\", \"confidence\": 0.9}".to_string(),
        )]);
        let (intent, confidence) = parse_intent(&provider, "find papers on diffusion models").await;
        assert_eq!(intent, Intent::Research);
        assert!((confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn falls_back_to_general_chat_on_unparseable_reply() {
        let provider = MockProvider::new(vec![ScriptedTurn::Text("not json".to_string())]);
        let (intent, confidence) = parse_intent(&provider, "hello").await;
        assert_eq!(intent, Intent::GeneralChat);
        assert!((confidence - 0.5).abs() < f64::EPSILON);
    }
}

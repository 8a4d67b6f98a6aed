//! Computer Timeline Capture (`spec.md` §4.6): a pass-through [`EventSink`]
//! wrapper that reduces browser/search-shaped events into an ordered list
//! of [`ComputerTimelineStep`]s for later replay, without altering what
//! subscribers downstream of it observe.
//!
//! Grounded on `helm-tool::middleware`'s `Next`-chain wrapping idiom: the
//! wrapper forwards every event unchanged and only *additionally*
//! inspects it, the same "wrapping is composable, the contract is
//! preserved" shape `spec.md` §4.1 describes for the tool executor.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use helm_proto::SessionId;

use crate::event::{EventSink, HelmEvent};

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "ref",
    "mc_cid",
    "mc_eid",
    "igshid",
];

/// Strip known tracking query parameters from a URL.
///
/// Not a full URL parser: splits on the first `?`, filters the
/// `key=value` query pairs, and rejoins. Malformed input is returned
/// unchanged rather than rejected, since this runs on untrusted tool
/// output. Satisfies `spec.md` §8 R3: idempotent under repeated
/// application.
pub fn normalize_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let (query, fragment) = match query.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (query, None),
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            !TRACKING_PARAMS.contains(&key)
        })
        .collect();

    let mut result = base.to_string();
    if !kept.is_empty() {
        result.push('?');
        result.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        result.push('#');
        result.push_str(fragment);
    }
    result
}

/// One reduced step of a turn's on-screen computer activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputerTimelineStep {
    /// `"search"`, `"browse"`, or `"finalize"`.
    pub kind: String,
    /// Normalized URL, if this step has one.
    pub url: Option<String>,
    /// Most recent screenshot attached to this step, if any.
    pub screenshot: Option<Value>,
    /// Emission timestamp of the event that produced this step.
    pub timestamp_ms: i64,
}

struct Inner {
    steps: Vec<ComputerTimelineStep>,
    saw_browser_action: bool,
}

/// Wraps an [`EventSink`], forwarding every event unchanged while
/// accumulating a [`ComputerTimelineStep`] list on the side.
pub struct TimelineCapture<S: EventSink> {
    inner_sink: S,
    state: Mutex<Inner>,
}

impl<S: EventSink> TimelineCapture<S> {
    /// Wrap `sink`. The timeline starts empty.
    pub fn new(sink: S) -> Self {
        Self {
            inner_sink: sink,
            state: Mutex::new(Inner { steps: Vec::new(), saw_browser_action: false }),
        }
    }

    /// The ordered timeline captured so far. Persisted on the assistant
    /// message's metadata per `spec.md` §4.6.
    pub fn timeline(&self) -> Vec<ComputerTimelineStep> {
        self.state.lock().expect("lock poisoned").steps.clone()
    }

    fn extract_url(payload: &Value) -> Option<String> {
        payload.get("url").and_then(Value::as_str).map(normalize_url)
    }

    fn reduce(&self, timestamp_ms: i64, event: &HelmEvent) {
        let mut state = self.state.lock().expect("lock poisoned");
        match event {
            HelmEvent::BrowserAction { action } => {
                state.saw_browser_action = true;
                state.steps.push(ComputerTimelineStep {
                    kind: "browse".to_string(),
                    url: Self::extract_url(action),
                    screenshot: None,
                    timestamp_ms,
                });
            }
            HelmEvent::BrowseActivity { activity } => {
                state.saw_browser_action = true;
                state.steps.push(ComputerTimelineStep {
                    kind: "browse".to_string(),
                    url: Self::extract_url(activity),
                    screenshot: None,
                    timestamp_ms,
                });
            }
            HelmEvent::BrowserScreenshot { image } | HelmEvent::BrowseScreenshot { image } => {
                if let Some(last) = state.steps.last_mut() {
                    last.screenshot = Some(image.clone());
                } else {
                    state.steps.push(ComputerTimelineStep {
                        kind: "browse".to_string(),
                        url: None,
                        screenshot: Some(image.clone()),
                        timestamp_ms,
                    });
                }
            }
            HelmEvent::BrowserClosed => {
                state.steps.push(ComputerTimelineStep {
                    kind: "finalize".to_string(),
                    url: None,
                    screenshot: None,
                    timestamp_ms,
                });
            }
            HelmEvent::ToolComplete { name, result, .. } if name == "web_search" && !state.saw_browser_action => {
                state.steps.push(ComputerTimelineStep {
                    kind: "search".to_string(),
                    url: Self::extract_url(result),
                    screenshot: None,
                    timestamp_ms,
                });
            }
            _ => {}
        }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for TimelineCapture<S> {
    async fn emit(&self, session_id: &SessionId, timestamp_ms: i64, event: HelmEvent) {
        self.reduce(timestamp_ms, &event);
        self.inner_sink.emit(session_id, timestamp_ms, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecordingEventSink;
    use serde_json::json;

    #[test]
    fn normalize_url_strips_known_tracking_params() {
        let url = "https://example.com/a?utm_source=x&id=1&gclid=y";
        assert_eq!(normalize_url(url), "https://example.com/a?id=1");
    }

    #[test]
    fn normalize_url_is_idempotent() {
        let url = "https://example.com/a?utm_source=x&id=1#frag";
        let once = normalize_url(url);
        let twice = normalize_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_url_passes_through_urls_without_query() {
        let url = "https://example.com/a";
        assert_eq!(normalize_url(url), url);
    }

    #[tokio::test]
    async fn browser_actions_and_screenshots_reduce_into_ordered_steps() {
        let capture = TimelineCapture::new(RecordingEventSink::new());
        let session_id = SessionId::new("sess_1");

        capture
            .emit(&session_id, 1, HelmEvent::BrowserAction { action: json!({"url": "https://a.test?utm_source=x"}) })
            .await;
        capture
            .emit(&session_id, 2, HelmEvent::BrowserScreenshot { image: json!("data:image/png;base64,abc") })
            .await;
        capture.emit(&session_id, 3, HelmEvent::BrowserClosed).await;

        let timeline = capture.timeline();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].url.as_deref(), Some("https://a.test"));
        assert!(timeline[0].screenshot.is_some());
        assert_eq!(timeline[1].kind, "finalize");
    }

    #[tokio::test]
    async fn search_completion_is_captured_only_absent_prior_browser_action() {
        let capture = TimelineCapture::new(RecordingEventSink::new());
        let session_id = SessionId::new("sess_1");

        capture
            .emit(
                &session_id,
                1,
                HelmEvent::ToolComplete {
                    tool_call_id: helm_proto::ToolCallId::new("call_1"),
                    name: "web_search".to_string(),
                    result: json!({"url": "https://search.test"}),
                },
            )
            .await;
        assert_eq!(capture.timeline().len(), 1);

        capture
            .emit(&session_id, 2, HelmEvent::BrowserAction { action: json!({}) })
            .await;
        capture
            .emit(
                &session_id,
                3,
                HelmEvent::ToolComplete {
                    tool_call_id: helm_proto::ToolCallId::new("call_2"),
                    name: "web_search".to_string(),
                    result: json!({}),
                },
            )
            .await;
        assert_eq!(capture.timeline().len(), 2, "second web_search must not add a step once a browser action was seen");
    }
}

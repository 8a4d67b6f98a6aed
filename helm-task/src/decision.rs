//! Tool-call admission decisions (`spec.md` §4.3).

use serde_json::Value;

use crate::state::TaskState;

/// Admit/deny outcome for a proposed tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Present only when denied; meant to be inserted verbatim as a
    /// tool-role message so the model incorporates the denial.
    pub reason: Option<String>,
}

impl ToolCallDecision {
    /// Build an admitting decision.
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    /// Build a denying decision with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

const PROGRESS_QUERY_MARKERS: &[&str] = &["progress", "status", "how far", "still working", "done yet"];

fn looks_like_progress_query(params: &Value) -> bool {
    let text = match params.get("q").or_else(|| params.get("query")) {
        Some(Value::String(s)) => s.to_lowercase(),
        _ => return false,
    };
    PROGRESS_QUERY_MARKERS.iter().any(|m| text.contains(m))
}

/// Decide whether `name` (with `params`) should be admitted, given the
/// task's accumulated state. `is_search_class` comes from the tool's
/// registry descriptor (`helm-tool::ToolDescriptor::is_search_class`).
pub fn get_tool_call_decision(state: &TaskState, name: &str, params: &Value, is_search_class: bool) -> ToolCallDecision {
    if is_search_class && state.search_class_used {
        return ToolCallDecision::deny(
            "Search already completed for this task. Synthesize your answer from the existing search results instead of searching again.",
        );
    }

    if is_search_class && state.artifact.is_some() && looks_like_progress_query(params) {
        return ToolCallDecision::deny(
            "The requested artifact has already been produced; no further search is needed to check on its progress.",
        );
    }

    tracing::debug!(tool = name, "tool call admitted");
    ToolCallDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::infer_goal;
    use crate::state::TaskState;
    use serde_json::json;

    fn fresh_state() -> TaskState {
        TaskState::initialize("sess_1", "user_1", &infer_goal("search for rust news"))
    }

    #[test]
    fn first_search_class_call_is_admitted() {
        let state = fresh_state();
        let decision = get_tool_call_decision(&state, "web_search", &json!({"q": "rust"}), true);
        assert!(decision.allowed);
    }

    #[test]
    fn second_search_class_call_is_denied() {
        let mut state = fresh_state();
        state.search_class_used = true;
        let decision = get_tool_call_decision(&state, "web_search", &json!({"q": "rust"}), true);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("Search already completed"));
    }

    #[test]
    fn progress_query_after_artifact_is_denied() {
        let mut state = fresh_state();
        state.artifact = Some(json!({"fileId": "f1"}));
        let decision =
            get_tool_call_decision(&state, "web_search", &json!({"q": "what's the status"}), true);
        assert!(!decision.allowed);
    }

    #[test]
    fn non_search_tool_is_never_quota_denied() {
        let mut state = fresh_state();
        state.search_class_used = true;
        let decision = get_tool_call_decision(&state, "read_file", &json!({}), false);
        assert!(decision.allowed);
    }
}

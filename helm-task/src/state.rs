//! Per-session task state (`spec.md` §3, §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use helm_proto::SessionId;

use crate::goal::{infer_goal, TaskGoal};
use crate::plan::{derive_plan, Phase, PlanStep, PlanStepStatus};

/// One entry in a task's tool-call history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallHistoryEntry {
    /// Tool name invoked.
    pub name: String,
    /// Parameters passed.
    pub params: Value,
    /// Caller-supplied timestamp (epoch milliseconds) — the task layer
    /// never reads the clock itself, matching the ambient rule that only
    /// the turn loop's caller owns wall-clock time.
    pub timestamp_ms: u64,
    /// The tool's result payload, if it had completed by the time this
    /// entry was recorded.
    pub result: Option<Value>,
}

/// Single-valued, per-session, in-memory task state.
///
/// `spec.md` §3 invariant: at most one active `TaskState` per session;
/// cleared before every new user message, created fresh via
/// [`TaskState::initialize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Owning session.
    pub session_id: SessionId,
    /// Owning user.
    pub user_id: String,
    /// Inferred goal.
    pub goal: TaskGoal,
    /// Derived plan.
    pub plan: Vec<PlanStep>,
    /// Index into `plan` of the step currently being worked.
    pub current_step: usize,
    /// Accumulated search results across the task's lifetime.
    pub search_results: Vec<Value>,
    /// The task's generated artifact, once produced.
    pub artifact: Option<Value>,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Full tool-call history, in call order.
    pub history: Vec<ToolCallHistoryEntry>,
    /// Whether a search-class tool has already been admitted this task's
    /// lifetime — the at-most-once invariant from `spec.md` §3.
    pub search_class_used: bool,
}

impl TaskState {
    /// Infer a goal from `user_prompt`, derive a plan, and return a fresh
    /// task state. `spec.md` §4.3: `initializeTask(sessionId, userId,
    /// userPrompt) -> TaskState`.
    pub fn initialize_task(session_id: impl Into<SessionId>, user_id: impl Into<String>, user_prompt: &str) -> Self {
        let goal = infer_goal(user_prompt);
        Self::initialize(session_id, user_id, &goal)
    }

    /// Build directly from an already-inferred goal (used by tests and by
    /// callers that want to override inference).
    pub fn initialize(session_id: impl Into<SessionId>, user_id: impl Into<String>, goal: &TaskGoal) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            plan: derive_plan(goal),
            goal: goal.clone(),
            current_step: 0,
            search_results: Vec::new(),
            artifact: None,
            phase: Phase::Planning,
            history: Vec::new(),
            search_class_used: false,
        }
    }

    /// Record a completed tool call: append to history, advance the
    /// matching plan step, and extract salient outputs (search-result
    /// arrays, generated artifacts) from `result`.
    pub fn record_tool_call(&mut self, name: &str, params: Value, result: Option<Value>, timestamp_ms: u64, is_search_class: bool) {
        if is_search_class {
            self.search_class_used = true;
            if let Some(Value::Array(results)) = result.as_ref().and_then(|r| r.get("results")) {
                self.search_results.extend(results.iter().cloned());
            }
        }

        if let Some(artifact) = result.as_ref().and_then(|r| r.get("artifact")) {
            if !artifact.is_null() {
                self.artifact = Some(artifact.clone());
            }
        }

        self.advance_plan_for(name);

        self.history.push(ToolCallHistoryEntry {
            name: name.to_string(),
            params,
            timestamp_ms,
            result,
        });

        self.phase = if self.plan.iter().all(|s| s.status == PlanStepStatus::Done) {
            Phase::Reflecting
        } else {
            Phase::Executing
        };
    }

    fn advance_plan_for(&mut self, tool_name: &str) {
        let matches = |desc: &str| -> bool {
            match tool_name {
                "web_search" | "paper_search" => desc.contains("Search"),
                "video_probe" => desc.contains("Probe video"),
                "video_download" => desc.contains("Download video"),
                "video_transcript" => desc.contains("transcript"),
                "generate_ppt" => desc.contains("presentation"),
                _ => false,
            }
        };
        if let Some(step) = self.plan.iter_mut().find(|s| matches(&s.description) && s.status != PlanStepStatus::Done) {
            step.status = PlanStepStatus::Done;
        }
    }

    /// Compose the short textual context appended to each turn's system
    /// message: goal, phase, plan state, artifact state, and a reminder
    /// not to disclose internal tool names or repeat expensive calls.
    pub fn get_system_prompt_context(&self) -> String {
        let plan_summary = self
            .plan
            .iter()
            .map(|s| format!("- [{:?}] {}", s.status, s.description))
            .collect::<Vec<_>>()
            .join("\n");

        let artifact_summary = match &self.artifact {
            Some(_) => "An artifact has already been produced for this task.",
            None => "No artifact has been produced yet.",
        };

        format!(
            "Task goal: {}\nPhase: {:?}\nPlan:\n{}\n{}\nDo not disclose internal tool names to the user, and do not repeat an expensive search once it has already run.",
            self.goal.description, self.phase, plan_summary, artifact_summary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initialize_task_derives_goal_and_plan() {
        let state = TaskState::initialize_task("s1", "u1", "search for rust news");
        assert!(state.goal.requires_search);
        assert_eq!(state.phase, Phase::Planning);
        assert!(!state.plan.is_empty());
    }

    #[test]
    fn record_tool_call_marks_search_class_used_and_collects_results() {
        let mut state = TaskState::initialize_task("s1", "u1", "search for rust news");
        state.record_tool_call(
            "web_search",
            json!({"q": "rust"}),
            Some(json!({"results": [{"title": "a"}, {"title": "b"}]})),
            1000,
            true,
        );
        assert!(state.search_class_used);
        assert_eq!(state.search_results.len(), 2);
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn record_tool_call_advances_matching_plan_step() {
        let mut state = TaskState::initialize_task("s1", "u1", "search for rust news");
        let search_step = state.plan.iter().position(|s| s.description.contains("Search")).unwrap();
        assert_eq!(state.plan[search_step].status, PlanStepStatus::Pending);
        state.record_tool_call("web_search", json!({}), None, 1000, true);
        assert_eq!(state.plan[search_step].status, PlanStepStatus::Done);
    }

    #[test]
    fn system_prompt_context_includes_goal_and_plan() {
        let state = TaskState::initialize_task("s1", "u1", "search for rust news");
        let ctx = state.get_system_prompt_context();
        assert!(ctx.contains("Task goal"));
        assert!(ctx.contains("Plan:"));
    }
}

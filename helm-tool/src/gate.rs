//! Quota admission gate (`spec.md` §4.2).
//!
//! This is the generic, descriptor-driven half of admission control: it
//! knows nothing about goals or plans, only "this tool is tagged
//! search-class and the quota for that tag is exhausted." `helm-task`'s
//! `TaskDirector::get_tool_call_decision` layers goal-aware denial rules
//! (progress/status query patterns, artifact-already-produced) on top of
//! this.

use std::collections::HashMap;

use crate::descriptor::ToolDescriptor;

/// Per-turn quota configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Maximum search-class tool calls admitted per gate lifetime
    /// (normally one turn). `spec.md` §3 documents the default as 1.
    pub search_class_quota: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { search_class_quota: 1 }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// User-opaque reason, present only when denied. Intended to be
    /// inserted as a tool-role message so the model incorporates the
    /// denial rather than retrying blindly.
    pub reason: Option<String>,
}

impl GateDecision {
    /// Build an admitting decision.
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    /// Build a denying decision with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// Tracks per-tag call counts for one turn and admits/denies accordingly.
///
/// Create a fresh `ToolGate` per turn — quotas do not persist across
/// turns at this layer (the cross-turn "at most once per task lifetime"
/// invariant lives in `helm-task::TaskState`).
pub struct ToolGate {
    config: GateConfig,
    search_class_calls: u32,
    calls_by_name: HashMap<String, u32>,
}

impl ToolGate {
    /// Build a gate with the given configuration.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            search_class_calls: 0,
            calls_by_name: HashMap::new(),
        }
    }

    /// Check whether `descriptor` may be invoked, recording the call if
    /// admitted. Denied calls are not counted.
    pub fn check_and_record(&mut self, descriptor: &ToolDescriptor) -> GateDecision {
        if descriptor.is_search_class && self.search_class_calls >= self.config.search_class_quota
        {
            return GateDecision::deny(
                "Search already completed for this task. Synthesize an answer from the existing results instead of searching again.",
            );
        }

        if descriptor.is_search_class {
            self.search_class_calls += 1;
        }
        *self.calls_by_name.entry(descriptor.name.clone()).or_insert(0) += 1;
        GateDecision::allow()
    }

    /// How many times a tool has been admitted so far this turn.
    pub fn calls_for(&self, name: &str) -> u32 {
        self.calls_by_name.get(name).copied().unwrap_or(0)
    }
}

impl Default for ToolGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_proto::DurationMs;
    use serde_json::json;

    fn search_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: "search".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_secs(5),
            requires_confirmation: false,
            is_search_class: true,
        }
    }

    #[test]
    fn second_search_class_call_is_denied() {
        let mut gate = ToolGate::default();
        let first = gate.check_and_record(&search_tool("web_search"));
        assert!(first.allowed);

        let second = gate.check_and_record(&search_tool("web_search"));
        assert!(!second.allowed);
        assert!(second.reason.unwrap().contains("Search already completed"));
    }

    #[test]
    fn non_search_tools_are_unbounded() {
        let mut gate = ToolGate::default();
        let descriptor = ToolDescriptor {
            name: "read_file".into(),
            description: "read".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_secs(5),
            requires_confirmation: false,
            is_search_class: false,
        };
        for _ in 0..5 {
            assert!(gate.check_and_record(&descriptor).allowed);
        }
        assert_eq!(gate.calls_for("read_file"), 5);
    }
}

//! Turn-loop configuration (`spec.md` §6's "Configuration" table).
//!
//! A single value handed to [`crate::turn::process_agent_turn`] by its
//! caller; the core never reads environment variables itself, matching
//! the teacher's pattern of passing a `ReactConfig`/`LoopConfig` value
//! into a loop rather than reaching for ambient config.

use helm_proto::DurationMs;

/// Per-turn limits and defaults for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on loop iterations (`agent.maxToolSteps`).
    pub max_tool_steps: u32,
    /// Base per-turn wall-clock budget for a non-video-heavy turn
    /// (`agent.maxExecutionTime`).
    pub max_execution_time: DurationMs,
    /// Floor budget for a video-heavy turn with no observed duration yet
    /// (`agent.maxVideoExecutionTime`).
    pub max_video_execution_time: DurationMs,
    /// Client-side idle hint; informational only, not enforced here
    /// (`agent.idleTimeout`).
    pub idle_timeout: DurationMs,
    /// Bound on how many prior messages the loop scans when looking for
    /// video-duration/transcript markers (`session.maxHistoryMessages`).
    pub max_history_messages: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 10,
            max_execution_time: DurationMs::from_secs(300),
            max_video_execution_time: DurationMs::from_secs(720),
            idle_timeout: DurationMs::from_secs(30),
            max_history_messages: 200,
        }
    }
}

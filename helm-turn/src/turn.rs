//! Turn Loop Controller (`spec.md` §4.5): the main orchestrator. One
//! [`TurnLoop`] is built per turn over the collaborators it needs —
//! model client, tool registry/executor, event sink, persistence store,
//! observability hooks — and its [`TurnLoop::process_agent_turn`] method
//! runs the bounded model-call/tool-execution loop to completion.
//!
//! Grounded directly on `neuron-op-react::ReactOperator<P>`: a struct
//! generic over `P: Provider` holding its collaborators, one public
//! entry point running a `loop { }` that dispatches hooks at fixed
//! points, calls the provider, branches on the response, executes tool
//! calls strictly sequentially, and returns once a stop condition is
//! reached. Where the teacher's loop branches on `EFFECT_TOOL_NAMES` for
//! its multi-agent delegation mechanism, this loop instead branches on
//! the spec's video/search tool-admission rules — the teacher's
//! *shape* survives, its domain-specific effect dispatch does not.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use serde_json::Value;

use helm_proto::{HookAction, HookContext, HookPoint, MessageId, ObservabilityHook, SessionId, StepId, ToolCallId, TraceId};
use helm_reasoning::{FinalStatus, Lifecycle, ReasoningEvent, ReasoningStateMachine, ReasoningStep, TimestampMs};
use helm_state::{PersistenceError, PersistenceStore, ToolCallRecord, ToolCallStatus};
use helm_task::{decision::get_tool_call_decision, TaskState};
use helm_tool::{ExecuteOutcome, ProgressHandler, ToolExecutor, ToolGate, ToolRegistry};
use helm_types::message::{Message, Role};
use helm_types::provider::{Provider, ProviderRequest, StopReason};
use helm_types::stream::{StreamAccumulator, StreamChunk};
use helm_types::ToolSchema;

use crate::config::OrchestratorConfig;
use crate::event::{EventSink, FinishReason, HelmEvent};
use crate::router;

/// A black-box transcript question-answering collaborator, consulted by
/// the mid-loop transcript short-circuit (`spec.md` §4.5) to answer
/// directly from a transcript already in the working list without
/// another model call. Distinct from [`router::classify_via_model`],
/// which only classifies intent for the pre-loop injection in
/// `spec.md` §4.9.
#[async_trait]
pub trait TranscriptQa: Send + Sync {
    /// Attempt to answer `user_question` from `transcript_text`. `None`
    /// means "can't answer from this transcript alone" — the caller
    /// falls through to the normal model-call loop.
    async fn answer(&self, transcript_text: &str, user_question: &str) -> Option<String>;
}

/// Result of one [`TurnLoop::process_agent_turn`] call.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant-visible text.
    pub content: String,
    /// Why the turn ended.
    pub finish_reason: FinishReason,
    /// Loop iterations completed.
    pub steps_taken: u32,
    /// The full reasoning trace, in emission order.
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Tool-call ids persisted via [`PersistenceStore::record_tool_call`]
    /// this turn, awaiting the finalization step's linking to the
    /// eventual assistant message id (`spec.md` §4.5 Finalization).
    pub pending_tool_call_ids: Vec<ToolCallId>,
}

const MAX_TRANSCRIPT_RETRY_INJECTIONS: u32 = 2;

/// Forwards a running tool's progress payloads across an unbounded
/// channel rather than back into the event sink directly — `on_progress`
/// must stay non-blocking (`spec.md` §4.1), while relaying decoded
/// `browser.*`/`tool.progress` events is itself async.
struct ChannelProgressHandler {
    tx: tokio::sync::mpsc::UnboundedSender<Value>,
}

impl ProgressHandler for ChannelProgressHandler {
    fn on_progress(&self, payload: Value) {
        let _ = self.tx.send(payload);
    }
}

fn now_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `T = max(12 min, (2*durationSeconds + 8 min) * 1s)` for video-heavy
/// turns with an observed duration; `maxVideoExecutionTime` as the floor
/// otherwise; `maxExecutionTime` for ordinary turns.
fn compute_budget(config: &OrchestratorConfig, video_heavy: bool, observed_duration_secs: Option<u64>) -> helm_proto::DurationMs {
    if !video_heavy {
        return config.max_execution_time;
    }
    match observed_duration_secs {
        Some(secs) => {
            let scaled = 2 * secs + 8 * 60;
            helm_proto::DurationMs::from_secs(scaled.max(12 * 60))
        }
        None => config.max_video_execution_time,
    }
}

fn observed_video_duration_secs(task_state: &TaskState) -> Option<u64> {
    task_state
        .history
        .iter()
        .rev()
        .find(|entry| entry.name == "video_probe")
        .and_then(|entry| entry.result.as_ref())
        .and_then(|result| result.get("durationSeconds"))
        .and_then(Value::as_u64)
}

fn timeout_message(video_heavy: bool) -> String {
    if video_heavy {
        "This is taking longer than expected to process the video. Please try again, \
         or with a shorter clip."
            .to_string()
    } else {
        "This is taking longer than expected. Please try again.".to_string()
    }
}

/// Strip hidden chain-of-thought markers before a draft is surfaced as
/// `thinkingContent`.
fn sanitize_thinking(text: &str) -> String {
    text.replace("<thinking>", "").replace("</thinking>", "").trim().to_string()
}

const CODE_SIGNALS: &[&str] = &["fn ", "function ", "class ", "import ", "def ", "#include", "```"];
const VIDEO_SIGNALS: &[&str] = &["video", "transcript", "timestamp", "watch", "clip", "footage"];

/// Heuristic: does `text` look like it drifted into writing code instead
/// of answering a video-grounded question?
fn looks_off_topic_for_video(text: &str) -> bool {
    let lower = text.to_lowercase();
    let code_score = CODE_SIGNALS.iter().filter(|s| lower.contains(*s)).count();
    let video_score = VIDEO_SIGNALS.iter().filter(|s| lower.contains(*s)).count();
    code_score >= 2 && video_score == 0
}

/// Tracks the reasoning-trace bookkeeping (step/event ids, per-step
/// sequence counters) the [`ReasoningStateMachine`] itself leaves to its
/// caller, and resolves accepted events back into full [`ReasoningStep`]
/// snapshots for emission as [`HelmEvent::ReasoningStep`].
struct ReasoningEmitter {
    sm: ReasoningStateMachine,
    trace_id: helm_proto::TraceId,
    next_step_index: u32,
    next_event_ordinal: u64,
    seqs: std::collections::HashMap<StepId, u32>,
}

impl ReasoningEmitter {
    fn new(trace_id: helm_proto::TraceId) -> Self {
        Self {
            sm: ReasoningStateMachine::new(trace_id.clone()),
            trace_id,
            next_step_index: 0,
            next_event_ordinal: 0,
            seqs: std::collections::HashMap::new(),
        }
    }

    fn next_seq(&mut self, step_id: &StepId) -> u32 {
        let seq = self.seqs.entry(step_id.clone()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn fresh_event_id(&mut self) -> String {
        self.next_event_ordinal += 1;
        format!("{}_{}", self.trace_id.as_str(), self.next_event_ordinal)
    }

    fn resolve(&self, events: &[ReasoningEvent]) -> Vec<ReasoningStep> {
        events
            .iter()
            .filter_map(|e| self.sm.steps_in_order().into_iter().find(|s| s.step_id == e.step_id).cloned())
            .collect()
    }

    fn start(&mut self, label: &str, now: TimestampMs) -> (StepId, Vec<ReasoningStep>) {
        let step_id = StepId::new(format!("{}_step_{}", self.trace_id.as_str(), self.next_step_index));
        let step_index = self.next_step_index;
        self.next_step_index += 1;
        let seq = self.next_seq(&step_id);
        let event = ReasoningEvent {
            event_id: self.fresh_event_id(),
            trace_id: self.trace_id.clone(),
            step_id: step_id.clone(),
            step_index,
            event_seq: seq,
            lifecycle: Lifecycle::Started,
            label: label.to_string(),
            message: None,
            details: None,
            thinking_content: None,
            final_status: None,
        };
        let accepted = self.sm.apply(event, now);
        let steps = self.resolve(&accepted);
        (step_id, steps)
    }

    fn update(&mut self, step_id: &StepId, label: &str, message: Option<String>, now: TimestampMs) -> Vec<ReasoningStep> {
        let seq = self.next_seq(step_id);
        let event = ReasoningEvent {
            event_id: self.fresh_event_id(),
            trace_id: self.trace_id.clone(),
            step_id: step_id.clone(),
            step_index: 0,
            event_seq: seq,
            lifecycle: Lifecycle::Updated,
            label: label.to_string(),
            message,
            details: None,
            thinking_content: None,
            final_status: None,
        };
        let accepted = self.sm.apply(event, now);
        self.resolve(&accepted)
    }

    fn finish(
        &mut self,
        step_id: &StepId,
        label: &str,
        final_status: FinalStatus,
        message: Option<String>,
        thinking_content: Option<String>,
        now: TimestampMs,
    ) -> Vec<ReasoningStep> {
        let seq = self.next_seq(step_id);
        let event = ReasoningEvent {
            event_id: self.fresh_event_id(),
            trace_id: self.trace_id.clone(),
            step_id: step_id.clone(),
            step_index: 0,
            event_seq: seq,
            lifecycle: Lifecycle::Finished,
            label: label.to_string(),
            message,
            details: None,
            thinking_content,
            final_status: Some(final_status),
        };
        let accepted = self.sm.apply(event, now);
        self.resolve(&accepted)
    }

    fn finalize(&mut self, now: TimestampMs) -> Vec<ReasoningStep> {
        let events = self.sm.finalize_trace(now);
        self.resolve(&events)
    }

    fn snapshot(&self) -> Vec<ReasoningStep> {
        self.sm.steps_in_order().into_iter().cloned().collect()
    }
}

/// The collaborators one turn needs, bundled the way
/// `neuron-op-react::ReactOperator<P>` bundles its provider/tools/hooks.
pub struct TurnLoop<'a, P: Provider> {
    provider: &'a P,
    tool_registry: &'a ToolRegistry,
    executor: &'a ToolExecutor,
    event_sink: &'a dyn EventSink,
    store: &'a dyn PersistenceStore,
    hooks: &'a [Arc<dyn ObservabilityHook>],
    transcript_qa: Option<&'a dyn TranscriptQa>,
    config: OrchestratorConfig,
}

impl<'a, P: Provider> TurnLoop<'a, P> {
    /// Build a turn loop over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &'a P,
        tool_registry: &'a ToolRegistry,
        executor: &'a ToolExecutor,
        event_sink: &'a dyn EventSink,
        store: &'a dyn PersistenceStore,
        hooks: &'a [Arc<dyn ObservabilityHook>],
        transcript_qa: Option<&'a dyn TranscriptQa>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { provider, tool_registry, executor, event_sink, store, hooks, transcript_qa, config }
    }

    async fn dispatch_hooks(&self, point: HookPoint, ctx: &HookContext) -> HookAction {
        for hook in self.hooks {
            if !hook.points().contains(&point) {
                continue;
            }
            match hook.on_event(point, ctx).await {
                Ok(action) if !action.is_continue() => return action,
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, ?point, "observability hook failed, continuing"),
            }
        }
        HookAction::Continue
    }

    async fn emit_reasoning(&self, session_id: &SessionId, now: TimestampMs, steps: Vec<ReasoningStep>) {
        for step in steps {
            self.event_sink.emit(session_id, now, HelmEvent::ReasoningStep { step }).await;
        }
    }

    /// Decode one tool-progress payload into the concrete browser events
    /// it implies (`spec.md` §4.5), and re-emit it verbatim as
    /// `tool.progress` regardless — the browser decoding is best-effort,
    /// the raw payload is always forwarded.
    async fn relay_tool_progress(&self, session_id: &SessionId, tool_call_id: &ToolCallId, payload: Value) {
        if let Some(action) = payload.get("action") {
            self.event_sink.emit(session_id, now_ms(), HelmEvent::BrowserAction { action: action.clone() }).await;
        }
        if let Some(screenshot) = payload.get("screenshot") {
            self.event_sink.emit(session_id, now_ms(), HelmEvent::BrowserScreenshot { image: screenshot.clone() }).await;
        }
        self.event_sink
            .emit(session_id, now_ms(), HelmEvent::ToolProgress { tool_call_id: tool_call_id.clone(), payload })
            .await;
    }

    /// Transcript Follow-up Router (`spec.md` §4.9), run once before the
    /// turn's first model call. The keyword heuristic
    /// ([`router::looks_like_transcript_followup`]) is checked first and
    /// costs nothing; the model-classifier fallback
    /// ([`router::classify_via_model`]) is only attempted when a
    /// completed `video_transcript` record actually exists for this
    /// session, so a session with no prior transcript never spends a
    /// model call (or, in tests, a scripted turn) on a classification
    /// that [`router::inject_transcript_context`] would find nothing to
    /// act on anyway.
    async fn apply_transcript_followup_router(&self, session_id: &SessionId, messages: &mut Vec<Message>) {
        let Some(user_text) = messages.iter().rev().find(|m| m.role == Role::User).map(|m| m.content.as_text_lossy()) else {
            return;
        };

        let is_followup = if router::looks_like_transcript_followup(&user_text) {
            true
        } else {
            let has_prior_transcript =
                self.store.find_latest_completed_tool_call(session_id, "video_transcript", None).await.ok().flatten().is_some();
            has_prior_transcript && router::classify_via_model(self.provider, &user_text).await
        };

        if is_followup {
            if let Err(err) = router::inject_transcript_context(self.store, session_id, None, messages).await {
                tracing::warn!(error = %err, "failed to inject transcript follow-up context");
            }
        }
    }

    /// Run `processAgentTurn` (`spec.md` §4.5) to completion.
    pub async fn process_agent_turn(
        &self,
        session_id: &SessionId,
        trace_id: &TraceId,
        mut messages: Vec<Message>,
        task_state: &mut TaskState,
        enabled_tools: Option<&HashSet<String>>,
    ) -> TurnOutcome {
        self.apply_transcript_followup_router(session_id, &mut messages).await;

        let start = Instant::now();
        let video_heavy = task_state.goal.is_video_heavy();
        let tools: Vec<ToolSchema> = self.tool_registry.tool_schemas(enabled_tools);
        let mut emitter = ReasoningEmitter::new(trace_id.clone());
        let mut gate = ToolGate::default();
        let mut steps_taken: u32 = 0;
        let mut transcript_retry_injections: u32 = 0;
        let mut pending_tool_call_ids: Vec<ToolCallId> = Vec::new();

        let (mut active_step, events) = emitter.start("Analyzing", now_ms());
        self.emit_reasoning(session_id, now_ms(), events).await;

        loop {
            steps_taken += 1;

            // Budget check.
            let observed_secs = observed_video_duration_secs(task_state);
            let budget = compute_budget(&self.config, video_heavy, observed_secs);
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if elapsed_ms > budget.as_millis() {
                let now = now_ms();
                let finish_events = emitter.finish(&active_step, "Generating response", FinalStatus::Failed, None, None, now);
                self.emit_reasoning(session_id, now, finish_events).await;
                let content = timeout_message(video_heavy);
                self.event_sink
                    .emit(session_id, now, HelmEvent::MessageComplete {
                        content: content.clone(),
                        finish_reason: FinishReason::Timeout,
                        assistant_message_id: None,
                    })
                    .await;
                let final_events = emitter.finalize(now_ms());
                self.emit_reasoning(session_id, now_ms(), final_events).await;
                return TurnOutcome {
                    content,
                    finish_reason: FinishReason::Timeout,
                    steps_taken,
                    reasoning_steps: emitter.snapshot(),
                    pending_tool_call_ids,
                };
            }

            // Mid-loop transcript short-circuit (spec.md 4.5), distinct from
            // the pre-loop router injection in router.rs (spec.md 4.9).
            if let Some(qa) = self.transcript_qa {
                if task_state.goal.requires_transcript {
                    if let Some(transcript_msg) = messages
                        .iter()
                        .rev()
                        .find(|m| m.role == Role::Tool && m.content.as_text_lossy().to_lowercase().contains("transcript"))
                    {
                        if let Some(user_question) = messages.iter().rev().find(|m| m.role == Role::User) {
                            let transcript_text = transcript_msg.content.as_text_lossy();
                            let question_text = user_question.content.as_text_lossy();
                            if let Some(answer) = qa.answer(&transcript_text, &question_text).await {
                                let now = now_ms();
                                self.event_sink.emit(session_id, now, HelmEvent::MessageDelta { delta: answer.clone() }).await;
                                self.event_sink
                                    .emit(session_id, now, HelmEvent::MessageComplete {
                                        content: answer.clone(),
                                        finish_reason: FinishReason::Stop,
                                        assistant_message_id: None,
                                    })
                                    .await;
                                let final_events = emitter.finalize(now);
                                self.emit_reasoning(session_id, now, final_events).await;
                                return TurnOutcome {
                                    content: answer,
                                    finish_reason: FinishReason::Stop,
                                    steps_taken,
                                    reasoning_steps: emitter.snapshot(),
                                    pending_tool_call_ids,
                                };
                            }
                        }
                    }
                }
            }

            // Hook: PreModelCall.
            let pre_ctx = HookContext::new(session_id.clone(), trace_id.clone()).with_step(active_step.clone());
            if let HookAction::Halt { reason } = self.dispatch_hooks(HookPoint::PreModelCall, &pre_ctx).await {
                return self.halt(session_id, &mut emitter, steps_taken, pending_tool_call_ids, reason).await;
            }

            let mut request_messages = messages.clone();
            request_messages.insert(0, Message::system(task_state.get_system_prompt_context()));
            let request = ProviderRequest {
                model: None,
                messages: request_messages,
                tools: tools.clone(),
                max_tokens: None,
                temperature: None,
                extra: Value::Null,
            };

            let stream = match self.provider.stream(request).await {
                Ok(stream) => stream,
                Err(err) => {
                    let now = now_ms();
                    self.event_sink.emit(session_id, now, HelmEvent::Error { message: err.to_string() }).await;
                    let final_events = emitter.finalize(now);
                    self.emit_reasoning(session_id, now, final_events).await;
                    return TurnOutcome {
                        content: String::new(),
                        finish_reason: FinishReason::Stop,
                        steps_taken,
                        reasoning_steps: emitter.snapshot(),
                        pending_tool_call_ids,
                    };
                }
            };
            pin_mut!(stream);

            let mut acc = StreamAccumulator::new();
            let mut first_content_seen = false;
            let mut stop_reason = StopReason::EndTurn;
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { continue };
                let was_first = acc.push(&chunk);
                if was_first && !first_content_seen {
                    first_content_seen = true;
                    let now = now_ms();
                    let events = emitter.update(&active_step, "Generating response", None, now);
                    self.emit_reasoning(session_id, now, events).await;
                }
                match &chunk {
                    StreamChunk::Content { delta } => {
                        self.event_sink.emit(session_id, now_ms(), HelmEvent::MessageDelta { delta: delta.clone() }).await;
                    }
                    StreamChunk::Done { stop_reason: sr, .. } => stop_reason = *sr,
                    StreamChunk::ToolCallDelta { .. } => {}
                }
            }

            // Hook: PostModelCall.
            let post_ctx = HookContext::new(session_id.clone(), trace_id.clone())
                .with_step(active_step.clone())
                .with_payload(Value::String(format!("{stop_reason:?}")));
            if let HookAction::Halt { reason } = self.dispatch_hooks(HookPoint::PostModelCall, &post_ctx).await {
                return self.halt(session_id, &mut emitter, steps_taken, pending_tool_call_ids, reason).await;
            }

            let (draft_text, tool_calls) = acc.finish();

            if tool_calls.is_empty() {
                match self
                    .finish_without_tool_calls(
                        session_id,
                        task_state,
                        video_heavy,
                        draft_text,
                        &mut messages,
                        &mut emitter,
                        &mut transcript_retry_injections,
                        steps_taken,
                        &pending_tool_call_ids,
                    )
                    .await
                {
                    Some(outcome) => return outcome,
                    // A required-transcript retry instruction was injected
                    // into `messages`; loop back for another model call.
                    None => continue,
                }
            }

            // Tool calls returned.
            if !draft_text.is_empty() {
                let now = now_ms();
                let finish_events =
                    emitter.finish(&active_step, "Reasoning", FinalStatus::Succeeded, None, Some(sanitize_thinking(&draft_text)), now);
                self.emit_reasoning(session_id, now, finish_events).await;
                let (new_step, start_events) = emitter.start("Executing tools", now_ms());
                active_step = new_step;
                self.emit_reasoning(session_id, now_ms(), start_events).await;
            }

            messages.push(Message::assistant_tool_calls(helm_proto::Content::text(draft_text), tool_calls.clone()));

            let mut seen_video_probe_urls: HashSet<String> = HashSet::new();
            let mut seen_video_transcript_urls: HashSet<String> = HashSet::new();

            for call in tool_calls {
                self.execute_one_tool_call(
                    session_id,
                    trace_id,
                    &mut active_step,
                    &mut emitter,
                    &mut gate,
                    task_state,
                    &mut messages,
                    &mut pending_tool_call_ids,
                    &mut seen_video_probe_urls,
                    &mut seen_video_transcript_urls,
                    call,
                )
                .await;
            }

            let now = now_ms();
            let thinking_events = emitter.update(
                &active_step,
                "Thinking",
                Some(format!("Reviewing {} tool result(s).", task_state.history.len())),
                now,
            );
            self.emit_reasoning(session_id, now, thinking_events).await;

            // Hook: ExitCheck.
            let exit_ctx = HookContext::new(session_id.clone(), trace_id.clone());
            if let HookAction::Halt { reason } = self.dispatch_hooks(HookPoint::ExitCheck, &exit_ctx).await {
                return self.halt(session_id, &mut emitter, steps_taken, pending_tool_call_ids, reason).await;
            }

            if steps_taken >= self.config.max_tool_steps {
                let now = now_ms();
                self.event_sink.emit(session_id, now, HelmEvent::AgentStepLimit { steps_taken }).await;
                let finish_events = emitter.finish(&active_step, "Thinking", FinalStatus::Succeeded, None, None, now);
                self.emit_reasoning(session_id, now, finish_events).await;
                let final_events = emitter.finalize(now_ms());
                self.emit_reasoning(session_id, now_ms(), final_events).await;
                return TurnOutcome {
                    content: String::new(),
                    finish_reason: FinishReason::MaxSteps,
                    steps_taken,
                    reasoning_steps: emitter.snapshot(),
                    pending_tool_call_ids,
                };
            }

            let (next_step, next_events) = emitter.start("Analyzing", now_ms());
            active_step = next_step;
            self.emit_reasoning(session_id, now_ms(), next_events).await;
        }
    }

    async fn halt(
        &self,
        session_id: &SessionId,
        emitter: &mut ReasoningEmitter,
        steps_taken: u32,
        pending_tool_call_ids: Vec<ToolCallId>,
        reason: String,
    ) -> TurnOutcome {
        let now = now_ms();
        self.event_sink.emit(session_id, now, HelmEvent::Error { message: reason.clone() }).await;
        let final_events = emitter.finalize(now);
        self.emit_reasoning(session_id, now, final_events).await;
        TurnOutcome {
            content: reason,
            finish_reason: FinishReason::Stop,
            steps_taken,
            reasoning_steps: emitter.snapshot(),
            pending_tool_call_ids,
        }
    }

    /// Handles a model response with no tool calls. Returns `None` when a
    /// required-transcript retry instruction was injected into `messages`
    /// instead of finishing the turn — the caller must loop back for
    /// another model call in that case.
    #[allow(clippy::too_many_arguments)]
    async fn finish_without_tool_calls(
        &self,
        session_id: &SessionId,
        task_state: &TaskState,
        video_heavy: bool,
        draft_text: String,
        messages: &mut Vec<Message>,
        emitter: &mut ReasoningEmitter,
        transcript_retry_injections: &mut u32,
        steps_taken: u32,
        pending_tool_call_ids: &[ToolCallId],
    ) -> Option<TurnOutcome> {
        let transcript_extracted = task_state.history.iter().any(|e| e.name == "video_transcript" && e.result.is_some());

        if task_state.goal.requires_transcript && !transcript_extracted {
            if *transcript_retry_injections < MAX_TRANSCRIPT_RETRY_INJECTIONS {
                *transcript_retry_injections += 1;
                messages.push(Message::system(
                    "A video transcript is required to answer this request but has not been \
                     extracted yet. Call the required video tools before responding.",
                ));
                return None;
            }

            let content = "I wasn't able to extract the video's transcript after multiple \
                            attempts. Please try again with a different link."
                .to_string();
            let now = now_ms();
            self.event_sink
                .emit(session_id, now, HelmEvent::MessageComplete {
                    content: content.clone(),
                    finish_reason: FinishReason::Stop,
                    assistant_message_id: None,
                })
                .await;
            let final_events = emitter.finalize(now);
            self.emit_reasoning(session_id, now, final_events).await;
            return Some(TurnOutcome {
                content,
                finish_reason: FinishReason::Stop,
                steps_taken,
                reasoning_steps: emitter.snapshot(),
                pending_tool_call_ids: pending_tool_call_ids.to_vec(),
            });
        }

        let content = if video_heavy && looks_off_topic_for_video(&draft_text) {
            "I'll answer using only what's in the video's transcript.".to_string()
        } else {
            draft_text
        };

        let now = now_ms();
        self.event_sink.emit(session_id, now, HelmEvent::MessageDelta { delta: content.clone() }).await;
        self.event_sink
            .emit(session_id, now, HelmEvent::MessageComplete {
                content: content.clone(),
                finish_reason: FinishReason::Stop,
                assistant_message_id: None,
            })
            .await;
        let final_events = emitter.finalize(now);
        self.emit_reasoning(session_id, now, final_events).await;
        Some(TurnOutcome {
            content,
            finish_reason: FinishReason::Stop,
            steps_taken,
            reasoning_steps: emitter.snapshot(),
            pending_tool_call_ids: pending_tool_call_ids.to_vec(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_one_tool_call(
        &self,
        session_id: &SessionId,
        trace_id: &TraceId,
        active_step: &mut StepId,
        emitter: &mut ReasoningEmitter,
        gate: &mut ToolGate,
        task_state: &mut TaskState,
        messages: &mut Vec<Message>,
        pending_tool_call_ids: &mut Vec<ToolCallId>,
        seen_video_probe_urls: &mut HashSet<String>,
        seen_video_transcript_urls: &mut HashSet<String>,
        call: helm_types::message::ToolCallRequest,
    ) {
        let helm_types::message::ToolCallRequest { id, name, mut arguments } = call;

        let deny = |reason: String| ExecuteOutcome::failed(reason, helm_proto::DurationMs::ZERO).to_tool_result_json();

        // video_download admission: only if the goal requires it.
        if name == "video_download" && !task_state.goal.requires_video_download {
            let reason = "Video download was not required for this task.".to_string();
            self.cancel_tool_step(session_id, emitter, &reason, now_ms()).await;
            messages.push(Message::tool_result(id.clone(), &deny(reason.clone())));
            self.event_sink.emit(session_id, now_ms(), HelmEvent::ToolError { tool_call_id: id, name, error: reason }).await;
            return;
        }

        // Duplicate video_probe/video_transcript suppression by URL, same turn.
        if name == "video_probe" || name == "video_transcript" {
            if let Some(url) = arguments.get("url").and_then(Value::as_str).map(str::to_string) {
                let seen = if name == "video_probe" { &mut *seen_video_probe_urls } else { &mut *seen_video_transcript_urls };
                if !seen.insert(url) {
                    let reason = format!("Skipped duplicate {} extraction for the same URL.", name.replace('_', " "));
                    self.cancel_tool_step(session_id, emitter, &reason, now_ms()).await;
                    messages.push(Message::tool_result(id.clone(), &deny(reason.clone())));
                    self.event_sink.emit(session_id, now_ms(), HelmEvent::ToolError { tool_call_id: id, name, error: reason }).await;
                    return;
                }
            }
        }

        // video_transcript argument injection.
        if name == "video_transcript" {
            if task_state.goal.requires_transcript {
                if let Some(obj) = arguments.as_object_mut() {
                    obj.insert("includeTimestamps".to_string(), Value::Bool(true));
                }
            }
            let missing_duration = arguments.get("durationSeconds").is_none();
            if missing_duration {
                if let Some(secs) = observed_video_duration_secs(task_state) {
                    if let Some(obj) = arguments.as_object_mut() {
                        obj.insert("durationSeconds".to_string(), Value::from(secs));
                    }
                }
            }
        }

        // Hook: PreToolCall.
        let mut pre_ctx = HookContext::new(session_id.clone(), trace_id.clone())
            .with_step(active_step.clone())
            .with_payload(serde_json::json!({"tool": name, "input": arguments}));
        match self.dispatch_hooks(HookPoint::PreToolCall, &pre_ctx).await {
            HookAction::Halt { reason } => {
                messages.push(Message::tool_result(id.clone(), &deny(reason.clone())));
                self.event_sink.emit(session_id, now_ms(), HelmEvent::ToolError { tool_call_id: id, name, error: reason }).await;
                return;
            }
            HookAction::SkipTool { reason } => {
                self.cancel_tool_step(session_id, emitter, &reason, now_ms()).await;
                messages.push(Message::tool_result(id.clone(), &deny(reason.clone())));
                self.event_sink.emit(session_id, now_ms(), HelmEvent::ToolError { tool_call_id: id, name, error: reason }).await;
                return;
            }
            HookAction::ModifyToolInput { new_input } => {
                arguments = new_input;
                pre_ctx = pre_ctx.with_payload(serde_json::json!({"tool": name, "input": arguments}));
                let _ = &pre_ctx;
            }
            _ => {}
        }

        let descriptor = self.tool_registry.descriptor(&name).cloned();
        let is_search_class = descriptor.as_ref().is_some_and(|d| d.is_search_class);

        let gate_decision = match &descriptor {
            Some(d) => gate.check_and_record(d),
            None => helm_tool::GateDecision::allow(),
        };

        let admission_reason = if !gate_decision.allowed {
            gate_decision.reason
        } else {
            let director_decision = get_tool_call_decision(task_state, &name, &arguments, is_search_class);
            if director_decision.allowed { None } else { director_decision.reason }
        };

        if let Some(reason) = admission_reason {
            self.cancel_tool_step(session_id, emitter, &reason, now_ms()).await;
            messages.push(Message::tool_result(id.clone(), &deny(reason.clone())));
            self.event_sink.emit(session_id, now_ms(), HelmEvent::ToolError { tool_call_id: id, name, error: reason }).await;
            return;
        }

        self.event_sink
            .emit(session_id, now_ms(), HelmEvent::ToolStart { tool_call_id: id.clone(), name: name.clone(), input: arguments.clone() })
            .await;

        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
        let progress_handler: Arc<dyn ProgressHandler> = Arc::new(ChannelProgressHandler { tx: progress_tx });
        let exec_fut = self.executor.execute(&name, arguments.clone(), Some(progress_handler));
        let relay_fut = async {
            while let Some(payload) = progress_rx.recv().await {
                self.relay_tool_progress(session_id, &id, payload).await;
            }
        };
        let (outcome, ()) = tokio::join!(exec_fut, relay_fut);

        // Hook: PostToolCall.
        let post_ctx = HookContext::new(session_id.clone(), trace_id.clone())
            .with_step(active_step.clone())
            .with_payload(outcome.to_tool_result_json());
        let outcome = match self.dispatch_hooks(HookPoint::PostToolCall, &post_ctx).await {
            HookAction::ModifyToolOutput { new_output } => ExecuteOutcome {
                success: outcome.success,
                output: new_output.to_string(),
                error: outcome.error,
                duration: outcome.duration,
                artifacts: outcome.artifacts,
                preview_snapshots: outcome.preview_snapshots,
            },
            _ => outcome,
        };

        task_state.record_tool_call(&name, arguments.clone(), Some(outcome.to_tool_result_json()), now_ms() as u64, is_search_class);

        let record = ToolCallRecord {
            session_id: session_id.clone(),
            tool_name: name.clone(),
            input: arguments.clone(),
            success: Some(outcome.success),
            output: Some(outcome.output.clone()),
            error: outcome.error.clone(),
            duration_ms: Some(outcome.duration.as_millis()),
            artifacts: outcome.artifacts.clone(),
            status: if outcome.success { ToolCallStatus::Completed } else { ToolCallStatus::Failed },
            assistant_message_id: None,
        };
        match self.store.record_tool_call(record).await {
            Ok(()) => pending_tool_call_ids.push(id.clone()),
            Err(PersistenceError::ForeignKeyViolation(_)) => {}
            Err(err) => tracing::warn!(error = %err, "failed to persist tool call record"),
        }

        for artifact in &outcome.artifacts {
            if artifact.file_id.is_some() {
                self.event_sink.emit(session_id, now_ms(), HelmEvent::FileCreated { artifact: artifact.clone() }).await;
            }
        }

        messages.push(Message::tool_result(id.clone(), &outcome.to_tool_result_json()));

        if outcome.success {
            self.event_sink
                .emit(session_id, now_ms(), HelmEvent::ToolComplete { tool_call_id: id, name, result: outcome.to_tool_result_json() })
                .await;
        } else {
            self.event_sink
                .emit(session_id, now_ms(), HelmEvent::ToolError {
                    tool_call_id: id,
                    name,
                    error: outcome.error.unwrap_or_else(|| "tool execution failed".to_string()),
                })
                .await;
        }
    }

    async fn cancel_tool_step(&self, session_id: &SessionId, emitter: &mut ReasoningEmitter, reason: &str, now: TimestampMs) {
        let (step_id, start_events) = emitter.start("Tool call skipped", now);
        self.emit_reasoning(session_id, now, start_events).await;
        let finish_events = emitter.finish(&step_id, "Tool call skipped", FinalStatus::Canceled, Some(reason.to_string()), None, now);
        self.emit_reasoning(session_id, now, finish_events).await;
    }
}

/// Finalization (`spec.md` §4.5): persist the assistant message, link
/// this turn's pending tool-call records to it, and touch the session's
/// `lastActiveAt`. A foreign-key violation (session deleted mid-turn) is
/// swallowed — `spec.md` §8 scenario 6 — by returning `None` rather than
/// propagating the error.
pub async fn finalize_turn(
    store: &dyn PersistenceStore,
    session_id: &SessionId,
    assistant_message: Message,
    pending_tool_call_ids: &[ToolCallId],
    now: i64,
) -> Option<MessageId> {
    match store.append_message(session_id, assistant_message, now).await {
        Ok(message_id) => {
            let _ = store.link_tool_calls_to_message(session_id, pending_tool_call_ids, &message_id).await;
            let _ = store.touch_session(session_id, now).await;
            Some(message_id)
        }
        Err(PersistenceError::ForeignKeyViolation(_)) => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to persist assistant message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::event::RecordingEventSink;
    use helm_proto::DurationMs;
    use helm_provider_mock::{MockProvider, ScriptedTurn};
    use helm_state::{MemoryPersistenceStore, SessionRecord, SessionStatus};
    use helm_tool::{ToolDescriptor, ToolDyn};
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoTool {
        name: &'static str,
    }

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn call(
            &self,
            input: Value,
            _on_progress: Option<Arc<dyn helm_tool::ProgressHandler>>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, helm_proto::ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(input) })
        }
    }

    struct BrowserProgressTool;

    impl ToolDyn for BrowserProgressTool {
        fn name(&self) -> &str {
            "browser_tool"
        }
        fn call(
            &self,
            _input: Value,
            on_progress: Option<Arc<dyn helm_tool::ProgressHandler>>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, helm_proto::ToolError>> + Send + '_>> {
            Box::pin(async move {
                if let Some(handler) = on_progress {
                    handler.on_progress(json!({"action": {"kind": "click", "x": 10, "y": 20}}));
                    handler.on_progress(json!({"screenshot": {"dataUrl": "data:image/png;base64,abc"}}));
                }
                Ok(json!({"success": true}))
            })
        }
    }

    fn registry_with_tools() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(
            ToolDescriptor {
                name: "web_search".to_string(),
                description: "search".to_string(),
                input_schema: json!({"type": "object"}),
                timeout: DurationMs::from_secs(5),
                requires_confirmation: false,
                is_search_class: true,
            },
            Arc::new(EchoTool { name: "web_search" }),
        );
        reg.register(
            ToolDescriptor {
                name: "video_transcript".to_string(),
                description: "transcript".to_string(),
                input_schema: json!({"type": "object"}),
                timeout: DurationMs::from_secs(5),
                requires_confirmation: false,
                is_search_class: false,
            },
            Arc::new(EchoTool { name: "video_transcript" }),
        );
        reg
    }

    fn active_session(store: &MemoryPersistenceStore, session_id: &SessionId) {
        store.create_session(SessionRecord {
            id: session_id.clone(),
            owner_id: "user_1".to_string(),
            workspace_path: "/workspaces/s".to_string(),
            status: SessionStatus::Active,
            last_active_at_ms: 0,
        });
    }

    #[tokio::test]
    async fn duplicate_video_transcript_is_suppressed_within_one_turn() {
        let registry = registry_with_tools();
        let executor = ToolExecutor::new(Arc::new(registry_with_tools()));
        let sink = RecordingEventSink::new();
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        active_session(&store, &session_id);

        let provider = MockProvider::new(vec![
            ScriptedTurn::ToolCalls(vec![
                ("video_transcript".to_string(), json!({"url": "https://example/v1"})),
                ("video_transcript".to_string(), json!({"url": "https://example/v1"})),
            ]),
            ScriptedTurn::Text("Here's the transcript summary.".to_string()),
        ]);

        let mut task_state = TaskState::initialize_task("sess_1", "user_1", "what's the transcript of https://example/v1?");

        let turn = TurnLoop::new(&provider, &registry, &executor, &sink, &store, &[], None, OrchestratorConfig::default());
        let outcome = turn.process_agent_turn(&session_id, &TraceId::new("trace_1"), vec![Message::user("transcript please")], &mut task_state, None).await;

        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        let tool_errors = sink.events().into_iter().filter(|(_, _, e)| matches!(e, HelmEvent::ToolError { .. })).count();
        assert_eq!(tool_errors, 1, "exactly one of the two identical calls should be suppressed");
    }

    #[tokio::test]
    async fn search_quota_denies_second_search_class_call() {
        let registry = registry_with_tools();
        let executor = ToolExecutor::new(Arc::new(registry_with_tools()));
        let sink = RecordingEventSink::new();
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        active_session(&store, &session_id);

        let provider = MockProvider::new(vec![
            ScriptedTurn::ToolCalls(vec![("web_search".to_string(), json!({"q": "a"}))]),
            ScriptedTurn::ToolCalls(vec![("web_search".to_string(), json!({"q": "b"}))]),
            ScriptedTurn::Text("Synthesized answer.".to_string()),
        ]);

        let mut task_state = TaskState::initialize_task("sess_1", "user_1", "search for rust news");

        let turn = TurnLoop::new(&provider, &registry, &executor, &sink, &store, &[], None, OrchestratorConfig::default());
        let outcome = turn.process_agent_turn(&session_id, &TraceId::new("trace_1"), vec![Message::user("search please")], &mut task_state, None).await;

        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        let denial = sink.events().into_iter().any(|(_, _, e)| matches!(e, HelmEvent::ToolError { error, .. } if error.contains("Search already completed")));
        assert!(denial, "second search-class call must be denied with the canonical quota message");
    }

    #[tokio::test]
    async fn step_limit_stops_the_loop_at_max_tool_steps() {
        let registry = registry_with_tools();
        let executor = ToolExecutor::new(Arc::new(registry_with_tools()));
        let sink = RecordingEventSink::new();
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        active_session(&store, &session_id);

        let provider = MockProvider::new(vec![ScriptedTurn::ToolCalls(vec![("web_search".to_string(), json!({"q": "a"}))])]);

        let mut task_state = TaskState::initialize_task("sess_1", "user_1", "hello");
        let mut config = OrchestratorConfig::default();
        config.max_tool_steps = 2;

        let turn = TurnLoop::new(&provider, &registry, &executor, &sink, &store, &[], None, config);
        let outcome = turn.process_agent_turn(&session_id, &TraceId::new("trace_1"), vec![Message::user("go")], &mut task_state, None).await;

        assert_eq!(outcome.finish_reason, FinishReason::MaxSteps);
        assert_eq!(outcome.steps_taken, 2);
        let step_limit_emitted = sink.events().into_iter().any(|(_, _, e)| matches!(e, HelmEvent::AgentStepLimit { .. }));
        assert!(step_limit_emitted);
    }

    #[tokio::test]
    async fn transcript_followup_router_injects_context_before_first_model_call() {
        let registry = registry_with_tools();
        let executor = ToolExecutor::new(Arc::new(registry_with_tools()));
        let sink = RecordingEventSink::new();
        let store = MemoryPersistenceStore::new();
        let session_id = SessionId::new("sess_1");
        active_session(&store, &session_id);

        store
            .record_tool_call(helm_state::ToolCallRecord {
                session_id: session_id.clone(),
                tool_name: "video_transcript".to_string(),
                input: json!({"url": "https://example/v1"}),
                success: Some(true),
                output: Some("the speaker discusses rust performance tips".to_string()),
                error: None,
                duration_ms: Some(10),
                artifacts: vec![],
                status: helm_state::ToolCallStatus::Completed,
                assistant_message_id: None,
            })
            .await
            .unwrap();

        let provider = MockProvider::new(vec![ScriptedTurn::Text("They discussed Rust performance tips.".to_string())]);

        let mut task_state = TaskState::initialize_task("sess_1", "user_1", "what did they say about performance?");

        let turn = TurnLoop::new(&provider, &registry, &executor, &sink, &store, &[], None, OrchestratorConfig::default());
        let outcome = turn
            .process_agent_turn(
                &session_id,
                &TraceId::new("trace_1"),
                vec![Message::user("what did they say about performance?")],
                &mut task_state,
                None,
            )
            .await;

        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        let requests = provider.requests().all();
        let first_request = requests.first().expect("at least one model request");
        let injected = first_request.messages.iter().any(|m| m.content.as_text_lossy().contains("rust performance tips"));
        assert!(injected, "router must inject the prior transcript before the first model call");
    }
}

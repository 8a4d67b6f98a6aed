//! The state machine proper: `spec.md` §4.4's five numbered transition
//! rules, plus `finalizeTrace`.

use std::collections::{HashMap, HashSet};

use helm_proto::{StepId, TraceId};

use crate::types::{FinalStatus, Lifecycle, ReasoningEvent, ReasoningStep, StepStatus, TimestampMs};

/// Strictly-ordered, at-most-one-running-step reasoning trace.
///
/// One instance per turn. Feed it [`ReasoningEvent`]s via [`Self::apply`]
/// in whatever order they arrive (including duplicated, reordered, or
/// interleaved-by-step); it returns the events actually accepted, in the
/// order they should be forwarded to subscribers.
pub struct ReasoningStateMachine {
    trace_id: TraceId,
    seen_event_ids: HashSet<String>,
    highest_seq: HashMap<StepId, u32>,
    active_step: Option<StepId>,
    pending: HashMap<StepId, Vec<ReasoningEvent>>,
    steps: HashMap<StepId, ReasoningStep>,
    emission_order: Vec<StepId>,
    last_emit: TimestampMs,
    late_events: Vec<ReasoningEvent>,
}

impl ReasoningStateMachine {
    /// Build an empty machine for one trace.
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            seen_event_ids: HashSet::new(),
            highest_seq: HashMap::new(),
            active_step: None,
            pending: HashMap::new(),
            steps: HashMap::new(),
            emission_order: Vec::new(),
            last_emit: TimestampMs::MIN,
            late_events: Vec::new(),
        }
    }

    /// Feed one event into the machine. `now` is the caller's current
    /// clock reading; the machine never reads a clock itself.
    ///
    /// Returns the (possibly empty, possibly multi-element if draining a
    /// pending queue cascaded) list of accepted events, each carrying the
    /// timestamp actually assigned at emission.
    pub fn apply(&mut self, event: ReasoningEvent, now: TimestampMs) -> Vec<ReasoningEvent> {
        let mut emitted = Vec::new();

        // Rule 1: dedupe by event id. Only applies to freshly arriving
        // events — a queued event being replayed out of `pending` was
        // already admitted past this check the first time it arrived.
        if self.seen_event_ids.contains(&event.event_id) {
            return emitted;
        }
        self.seen_event_ids.insert(event.event_id.clone());

        self.admit(event, now, &mut emitted);
        emitted
    }

    /// Rules 2-5: everything after the dedupe check. Shared by freshly
    /// arrived events and by events replayed out of `pending`.
    fn admit(&mut self, event: ReasoningEvent, now: TimestampMs, emitted: &mut Vec<ReasoningEvent>) {
        // Rule 2: the step is already terminal.
        if let Some(step) = self.steps.get(&event.step_id) {
            if step.status == StepStatus::Completed {
                self.late_events.push(event);
                return;
            }
        }

        // Rule 3: monotonicity guard. `event_seq` is 1-based; a step's
        // first event always exceeds the default `highest` of 0.
        let highest = self.highest_seq.get(&event.step_id).copied().unwrap_or(0);
        if event.event_seq <= highest {
            return;
        }

        // Rule 4: a different step is currently active — queue this one.
        if let Some(active) = &self.active_step {
            if active != &event.step_id {
                self.pending.entry(event.step_id.clone()).or_default().push(event);
                return;
            }
        }

        // Rule 5: emit.
        let emit_at = now.max(self.last_emit + 1);
        self.last_emit = emit_at;
        self.highest_seq.insert(event.step_id.clone(), event.event_seq);

        let mut emitted_event = event.clone();

        match event.lifecycle {
            Lifecycle::Started => {
                self.active_step = Some(event.step_id.clone());
                self.emission_order.push(event.step_id.clone());
                self.steps
                    .insert(event.step_id.clone(), ReasoningStep::from_started(&event, emit_at));
            }
            Lifecycle::Updated => {
                if let Some(step) = self.steps.get_mut(&event.step_id) {
                    step.apply_update(&event);
                }
            }
            Lifecycle::Finished => {
                if let Some(step) = self.steps.get_mut(&event.step_id) {
                    step.apply_finish(&event, emit_at);
                }
                self.active_step = None;
            }
        }

        emitted_event.event_seq = event.event_seq;
        emitted.push(emitted_event);

        if event.lifecycle == Lifecycle::Finished {
            self.drain_pending(now, emitted);
        }
    }

    /// Select the queued step with the lowest `step_index` and replay its
    /// events in sequence order, recursing since a replayed FINISHED may
    /// itself trigger another drain.
    fn drain_pending(&mut self, now: TimestampMs, emitted: &mut Vec<ReasoningEvent>) {
        let Some(next_step_id) = self
            .pending
            .iter()
            .min_by_key(|(_, events)| events.first().map(|e| e.step_index).unwrap_or(u32::MAX))
            .map(|(id, _)| id.clone())
        else {
            return;
        };

        let Some(mut queued) = self.pending.remove(&next_step_id) else {
            return;
        };
        queued.sort_by_key(|e| e.event_seq);

        for event in queued {
            self.admit(event, now, emitted);
        }
    }

    /// Force any lingering running step to `Completed`/`Succeeded` and
    /// drain whatever remains pending, guaranteeing trace termination at
    /// turn end.
    pub fn finalize_trace(&mut self, now: TimestampMs) -> Vec<ReasoningEvent> {
        let mut emitted = Vec::new();

        if let Some(active) = self.active_step.clone() {
            let emit_at = now.max(self.last_emit + 1);
            self.last_emit = emit_at;
            if let Some(step) = self.steps.get_mut(&active) {
                step.status = StepStatus::Completed;
                step.final_status = Some(FinalStatus::Succeeded);
                step.completed_at = Some(emit_at);
                step.duration_ms = Some((emit_at - step.started_at).max(0) as u64);
            }
            self.active_step = None;
            self.drain_pending(now, &mut emitted);
        }

        // Any steps still queued with no chance to become active (their
        // earlier sibling was never resolved) are dropped silently after
        // finalize — nothing more can legitimately start once the turn
        // has ended.
        self.pending.clear();

        emitted
    }

    /// Steps in emission order (first-STARTED order), current snapshot.
    pub fn steps_in_order(&self) -> Vec<&ReasoningStep> {
        self.emission_order.iter().filter_map(|id| self.steps.get(id)).collect()
    }

    /// How many steps currently show `status == Running`. Always `0` or
    /// `1` if the invariants hold.
    pub fn running_count(&self) -> usize {
        self.steps.values().filter(|s| s.status == StepStatus::Running).count()
    }

    /// Events accepted but dropped because their step had already
    /// finished — kept for diagnostics, never replayed.
    pub fn late_events(&self) -> &[ReasoningEvent] {
        &self.late_events
    }

    /// The trace this machine is tracking.
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }
}

//! Attention scheduling for autonomous agents.
//!
//! Each agent has a runtime state row in an arena table owned by this
//! scheduler: a next-processing deadline, a busy flag, and combat pacing
//! fields. Incoming stimuli are classified into priority classes and turn
//! into randomized reaction deadlines; deadline merges always keep the
//! earliest. Each tick the due set is drained earliest-deadline-first under
//! a global concurrency cap, launching decision calls as spawned tasks that
//! always report completion back over a channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{AgentDecision, DecisionContext, EventType, GameEvent};
use tokio::sync::mpsc;
use tracing::warn;

use crate::decision::{DecisionBackend, DecisionError};

/// While in combat, an agent is forced due at this cadence regardless of
/// its computed deadline.
pub const COMBAT_CADENCE_MS: u64 = 2_000;
/// `in_combat` lapses once this long has passed since the last qualifying
/// combat event, checked lazily at each scheduling evaluation.
pub const COMBAT_WINDOW_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Stimulus classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimulusClass {
    Critical,
    High,
    Medium,
    Low,
}

impl StimulusClass {
    /// Reaction delay range in milliseconds, inclusive on both ends.
    pub fn delay_range_ms(self) -> (u64, u64) {
        match self {
            StimulusClass::Critical => (500, 1_500),
            StimulusClass::High => (1_000, 2_500),
            StimulusClass::Medium => (3_000, 5_000),
            StimulusClass::Low => (5_000, 10_000),
        }
    }
}

/// Classify an event as a scheduling stimulus for the named agent.
/// Returns `None` for event types that never trigger a reaction.
pub fn classify_stimulus(event: &GameEvent, agent_name: &str) -> Option<StimulusClass> {
    match event.event_type {
        EventType::CombatStart | EventType::CombatHit | EventType::Death => {
            Some(StimulusClass::Critical)
        }
        EventType::Speech | EventType::Whisper => {
            let message = event
                .data
                .get("message")
                .and_then(|value| value.as_str())
                .unwrap_or("");
            if !agent_name.is_empty()
                && message.to_lowercase().contains(&agent_name.to_lowercase())
            {
                Some(StimulusClass::High)
            } else {
                Some(StimulusClass::Medium)
            }
        }
        EventType::Movement | EventType::PlayerEntered | EventType::PlayerLeft => {
            Some(StimulusClass::Medium)
        }
        EventType::Shout => Some(StimulusClass::Low),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Deterministic delay sampling
// ---------------------------------------------------------------------------

fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

fn stable_str_hash(input: &str) -> u64 {
    let mut hash = 0_u64;
    for byte in input.as_bytes() {
        hash = hash.rotate_left(5) ^ u64::from(*byte);
        hash = hash.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }
    hash
}

fn sample_range_ms(seed: u64, stream: u64, min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let span = max - min + 1;
    min + mix_seed(seed, stream) % span
}

// ---------------------------------------------------------------------------
// Per-agent runtime state
// ---------------------------------------------------------------------------

/// Scheduling state for one agent. Created lazily on first reference and
/// mutated only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRuntimeState {
    pub next_processing_at: Option<u64>,
    pub is_processing: bool,
    pub last_processed_at: u64,
    pub in_combat: bool,
    pub last_combat_event_at: u64,
    /// Re-armed whenever the agent finishes processing; consumed by the
    /// one-shot idle wake so repeated ticking cannot idle-spam.
    idle_wake_armed: bool,
}

impl AgentRuntimeState {
    fn new(now_ms: u64) -> Self {
        Self {
            next_processing_at: None,
            is_processing: false,
            last_processed_at: now_ms,
            in_combat: false,
            last_combat_event_at: 0,
            idle_wake_armed: true,
        }
    }
}

/// Completion report from a spawned decision task. Sent on every path,
/// success or failure, so scheduling capacity can never leak.
#[derive(Debug)]
pub struct DecisionOutcome {
    pub agent_id: String,
    pub result: Result<Option<AgentDecision>, DecisionError>,
}

// ---------------------------------------------------------------------------
// AttentionScheduler
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AttentionScheduler {
    states: BTreeMap<String, AgentRuntimeState>,
    seed: u64,
    draw_counter: u64,
    max_concurrent: usize,
    idle_window_ms: u64,
    outcome_tx: mpsc::UnboundedSender<DecisionOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<DecisionOutcome>,
}

impl AttentionScheduler {
    pub fn new(seed: u64, max_concurrent: usize, idle_window_ms: u64) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            states: BTreeMap::new(),
            seed,
            draw_counter: 0,
            max_concurrent: max_concurrent.max(1),
            idle_window_ms: idle_window_ms.max(1),
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn state(&self, agent_id: &str) -> Option<&AgentRuntimeState> {
        self.states.get(agent_id)
    }

    /// Lazily create the runtime row for an agent.
    pub fn touch(&mut self, agent_id: &str, now_ms: u64) {
        self.states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRuntimeState::new(now_ms));
    }

    /// Drop an agent's runtime row (death or removal from the world).
    pub fn remove(&mut self, agent_id: &str) {
        self.states.remove(agent_id);
    }

    /// Number of agents with an in-flight decision call.
    pub fn in_flight(&self) -> usize {
        self.states.values().filter(|state| state.is_processing).count()
    }

    fn draw(&mut self, agent_id: &str, min_ms: u64, max_ms: u64) -> u64 {
        self.draw_counter = self.draw_counter.wrapping_add(1);
        let stream = self.draw_counter.wrapping_add(stable_str_hash(agent_id));
        sample_range_ms(self.seed, stream, min_ms, max_ms)
    }

    /// Feed a stimulus destined for an agent. Computes a reaction deadline
    /// from the priority class and merges it with any existing deadline,
    /// keeping the earliest. Qualifying combat events additionally flip the
    /// agent into combat pacing.
    pub fn observe(&mut self, agent_id: &str, agent_name: &str, event: &GameEvent, now_ms: u64) {
        self.touch(agent_id, now_ms);

        if event.event_type.is_combat() {
            self.note_combat(agent_id, now_ms);
        }

        let Some(class) = classify_stimulus(event, agent_name) else {
            return;
        };
        let (min_ms, max_ms) = class.delay_range_ms();
        let delay = self.draw(agent_id, min_ms, max_ms);
        self.request_wake(agent_id, now_ms.saturating_add(delay));
    }

    /// Flip an agent into combat pacing. Applies to any agent named in a
    /// qualifying combat event, the initiator included, so the forced
    /// cadence covers agents acting as well as agents acted upon.
    pub fn note_combat(&mut self, agent_id: &str, now_ms: u64) {
        self.touch(agent_id, now_ms);
        if let Some(state) = self.states.get_mut(agent_id) {
            state.in_combat = true;
            state.last_combat_event_at = now_ms;
        }
    }

    /// Merge a requested deadline: an earlier deadline always wins and is
    /// never pushed later by a subsequent lower-priority request.
    pub fn request_wake(&mut self, agent_id: &str, at_ms: u64) {
        let state = self
            .states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRuntimeState::new(at_ms));
        state.next_processing_at = Some(match state.next_processing_at {
            Some(existing) => existing.min(at_ms),
            None => at_ms,
        });
    }

    fn refresh_combat(state: &mut AgentRuntimeState, now_ms: u64) {
        if state.in_combat
            && now_ms.saturating_sub(state.last_combat_event_at) >= COMBAT_WINDOW_MS
        {
            state.in_combat = false;
        }
    }

    /// Whether the agent is in combat as of `now_ms`, applying the lazy
    /// 10-second lapse.
    pub fn is_in_combat(&mut self, agent_id: &str, now_ms: u64) -> bool {
        match self.states.get_mut(agent_id) {
            Some(state) => {
                Self::refresh_combat(state, now_ms);
                state.in_combat
            }
            None => false,
        }
    }

    /// Build this tick's due set: lazily lapse combat flags, arm the
    /// one-shot idle wake for agents inside `[W, 2W)` since last
    /// processing, then take eligible agents earliest-deadline-first up to
    /// the remaining concurrency budget.
    pub fn due_agents(&mut self, now_ms: u64) -> Vec<String> {
        let budget = self.max_concurrent.saturating_sub(self.in_flight());
        if budget == 0 {
            return Vec::new();
        }

        let idle_window = self.idle_window_ms;
        let mut eligible: Vec<(u64, String)> = Vec::new();
        for (agent_id, state) in &mut self.states {
            Self::refresh_combat(state, now_ms);
            if state.is_processing {
                continue;
            }

            // One-shot idle wake: only inside [W, 2W) since last processing,
            // only while no stimulus deadline is pending, and only once per
            // arming. Past 2W nothing fires until the agent is processed.
            if state.next_processing_at.is_none() && state.idle_wake_armed {
                let idle_for = now_ms.saturating_sub(state.last_processed_at);
                if idle_for >= idle_window && idle_for < idle_window.saturating_mul(2) {
                    state.next_processing_at = Some(now_ms);
                    state.idle_wake_armed = false;
                }
            }

            let deadline_due = state
                .next_processing_at
                .map_or(false, |deadline| now_ms >= deadline);
            let combat_forced = state.in_combat
                && now_ms.saturating_sub(state.last_processed_at) >= COMBAT_CADENCE_MS;
            if deadline_due || combat_forced {
                let sort_key = state.next_processing_at.unwrap_or(u64::MAX);
                eligible.push((sort_key, agent_id.clone()));
            }
        }

        eligible.sort();
        eligible.truncate(budget);
        eligible.into_iter().map(|(_, agent_id)| agent_id).collect()
    }

    /// Mark an agent busy and spawn its decision call. The task reports a
    /// `DecisionOutcome` on every path, so the busy flag is always released
    /// by a later `drain_outcomes`.
    pub fn launch(
        &mut self,
        agent_id: &str,
        context: DecisionContext,
        backend: Arc<dyn DecisionBackend>,
        now_ms: u64,
    ) {
        let state = self
            .states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRuntimeState::new(now_ms));
        if state.is_processing {
            return;
        }
        state.is_processing = true;
        state.next_processing_at = None;

        let outcome_tx = self.outcome_tx.clone();
        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            let result = backend.decide(context).await;
            let _ = outcome_tx.send(DecisionOutcome { agent_id, result });
        });
    }

    /// Unconditional post-decision cleanup: clear the busy flag, stamp the
    /// processing time, re-arm the idle wake and schedule the next
    /// idle-class deadline. Runs for failures exactly as for successes.
    /// A stimulus deadline that arrived while the decision was in flight
    /// is kept: the idle deadline merges via min, never overwrites.
    pub fn mark_completed(&mut self, agent_id: &str, now_ms: u64) {
        let idle_window = self.idle_window_ms;
        let delay = self.draw(agent_id, idle_window, idle_window.saturating_mul(2) - 1);
        if let Some(state) = self.states.get_mut(agent_id) {
            state.is_processing = false;
            state.last_processed_at = now_ms;
            state.idle_wake_armed = true;
            let idle_at = now_ms.saturating_add(delay);
            state.next_processing_at = Some(match state.next_processing_at {
                Some(existing) => existing.min(idle_at),
                None => idle_at,
            });
        }
    }

    /// Collect finished decision calls. Failures are logged and isolated;
    /// the agent's state is reset either way so one failing agent cannot
    /// stall others or leak scheduling capacity.
    pub fn drain_outcomes(&mut self, now_ms: u64) -> Vec<(String, AgentDecision)> {
        let mut decisions = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.mark_completed(&outcome.agent_id, now_ms);
            match outcome.result {
                Ok(Some(decision)) => decisions.push((outcome.agent_id, decision)),
                Ok(None) => {}
                Err(err) => {
                    warn!(agent_id = %outcome.agent_id, error = %err, "decision call failed");
                }
            }
        }
        decisions
    }
}

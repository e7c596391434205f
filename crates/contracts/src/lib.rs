//! Cross-boundary contracts shared by the realm runtime core, the sqlite
//! store, and the CLI driver.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Closed set of event types the runtime emits. The range table in
/// `realm-core` is a total function over this enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Movement,
    CombatStart,
    CombatHit,
    Death,
    Speech,
    Whisper,
    Shout,
    Emote,
    ItemPickup,
    ItemDrop,
    PlayerEntered,
    PlayerLeft,
    RoomDescription,
    System,
    Ambient,
    Explosion,
    AdminAction,
}

impl EventType {
    /// Combat stimuli that flip an agent into its combat pacing mode.
    pub fn is_combat(self) -> bool {
        matches!(self, Self::CombatStart | Self::CombatHit | Self::Death)
    }
}

/// Who an event is allowed to reach.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Range-limited by the event type's hop distance from the origin room.
    Room,
    /// Every connected occupant, regardless of distance.
    Global,
    /// Only the originating actor.
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorRef {
    pub actor_id: String,
    pub actor_kind: String,
}

/// A world event. Immutable once created; the propagator renders a
/// per-recipient perspective from `data` without mutating the event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub at_ms: u64,
    pub origin_room_id: String,
    pub visibility: Visibility,
    pub actors: Vec<ActorRef>,
    pub data: Value,
}

impl GameEvent {
    /// The acting entity, by convention the first actor reference.
    pub fn actor_id(&self) -> Option<&str> {
        self.actors.first().map(|actor| actor.actor_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Player,
    Agent,
}

/// A raw-text command awaiting execution. Lives only inside the command
/// queue for the duration of one tick cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    pub command_id: String,
    pub source: CommandSource,
    pub actor_id: String,
    pub raw: String,
    pub enqueued_at_ms: u64,
}

/// Outcome of one executed command. Validation failures are surfaced here
/// and never interrupt the tick or the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub command_id: String,
    pub ok: bool,
    pub message: String,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.command_id,
            if self.ok { "ok" } else { "failed" },
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// World records
// ---------------------------------------------------------------------------

/// A room as authored by the world collaborator. Exits are directed and
/// need not be symmetric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomRecord {
    pub room_id: String,
    pub name: String,
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
}

/// Live character state, round-tripped through the persistence store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacterRecord {
    pub character_id: String,
    pub name: String,
    pub room_id: String,
    pub hp: i64,
    pub max_hp: i64,
    pub power: i64,
    pub defense: i64,
    pub alive: bool,
    /// Agents are scheduled for decisions; players get direct delivery.
    pub is_agent: bool,
    /// Admin recipients see the omniscient rendering.
    #[serde(default)]
    pub is_admin: bool,
}

// ---------------------------------------------------------------------------
// Agent event queue snapshot
// ---------------------------------------------------------------------------

/// One timestamped line in an agent's recent-context window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueLine {
    pub at_ms: u64,
    pub text: String,
}

/// Serialized form of an agent's event queue: recent formatted events plus
/// the agent's own recent outputs, both windowed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentQueueSnapshot {
    #[serde(default)]
    pub entries: Vec<QueueLine>,
    #[serde(default)]
    pub self_outputs: Vec<QueueLine>,
}

// ---------------------------------------------------------------------------
// Decision contract
// ---------------------------------------------------------------------------

/// The recent-context input handed to the external decision function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionContext {
    pub agent_id: String,
    pub agent_name: String,
    pub in_combat: bool,
    pub now_ms: u64,
    pub recent_events: Vec<String>,
    pub recent_outputs: Vec<String>,
}

/// An action chosen by the decision backend; re-enters the command pipeline
/// as an agent-originated command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDecision {
    pub command: String,
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub schema_version: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    /// Tick cadence of the cooperative loop, in real milliseconds.
    pub tick_interval_ms: u64,
    /// Game-seconds advanced per real second by the world clock.
    pub clock_speed_factor: f64,
    /// Cap on concurrent in-flight decision calls across all agents.
    pub max_concurrent_decisions: usize,
    /// Idle window W: an unstimulated agent wakes once in [W, 2W).
    pub idle_window_ms: u64,
    /// Retention window for agent event queues.
    pub queue_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: 1337,
            tick_interval_ms: 250,
            clock_speed_factor: 60.0,
            max_concurrent_decisions: 4,
            idle_window_ms: 45_000,
            queue_window_ms: 90_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_round_trips_as_snake_case() {
        let raw = serde_json::to_string(&EventType::CombatStart).expect("serialize");
        assert_eq!(raw, "\"combat_start\"");
        let back: EventType = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, EventType::CombatStart);
    }

    #[test]
    fn combat_stimuli_are_classified() {
        assert!(EventType::CombatStart.is_combat());
        assert!(EventType::CombatHit.is_combat());
        assert!(EventType::Death.is_combat());
        assert!(!EventType::Speech.is_combat());
        assert!(!EventType::Shout.is_combat());
    }

    #[test]
    fn config_seed_accepts_string_or_number() {
        let from_string: EngineConfig = serde_json::from_value(json!({
            "schema_version": "1.0",
            "seed": "42",
            "tick_interval_ms": 250,
            "clock_speed_factor": 60.0,
            "max_concurrent_decisions": 4,
            "idle_window_ms": 45000,
            "queue_window_ms": 90000,
        }))
        .expect("string seed");
        assert_eq!(from_string.seed, 42);
    }

    #[test]
    fn queue_snapshot_defaults_to_empty_lists() {
        let snapshot: AgentQueueSnapshot = serde_json::from_value(json!({})).expect("empty");
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.self_outputs.is_empty());
    }

    #[test]
    fn event_actor_id_is_first_actor() {
        let event = GameEvent {
            event_id: "evt_1".to_string(),
            event_type: EventType::Speech,
            at_ms: 0,
            origin_room_id: "room:square".to_string(),
            visibility: Visibility::Room,
            actors: vec![
                ActorRef {
                    actor_id: "char:alice".to_string(),
                    actor_kind: "speaker".to_string(),
                },
                ActorRef {
                    actor_id: "char:bob".to_string(),
                    actor_kind: "listener".to_string(),
                },
            ],
            data: json!({ "message": "hello" }),
        };
        assert_eq!(event.actor_id(), Some("char:alice"));
    }
}

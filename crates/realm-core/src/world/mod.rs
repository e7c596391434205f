//! World orchestrator: owns the character table, room graph, occupancy
//! index and every runtime subsystem, and wires them together. Command
//! handling lives in `commands.rs`, the per-tick fan-out in `step.rs`.

mod commands;
mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    ActorRef, CharacterRecord, Command, CommandResult, EngineConfig, EventType, GameEvent,
    RoomRecord, Visibility,
};
use serde_json::Value;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::info;

use crate::agent_queue::AgentEventQueue;
use crate::attention::AttentionScheduler;
use crate::clock::{ClockNotice, WorldClock};
use crate::combat::CombatSystem;
use crate::decision::{DecisionBackend, NullBackend};
use crate::propagation::{DeliverySink, EventPropagator, OccupantInfo, Occupancy};
use crate::room_graph::{RoomGraph, TopologyError};

pub struct GameWorld {
    config: EngineConfig,
    now_ms: u64,
    tick_count: u64,
    sequence_in_tick: u64,
    rooms: BTreeMap<String, RoomRecord>,
    characters: BTreeMap<String, CharacterRecord>,
    occupancy: Occupancy,
    graph: RoomGraph,
    propagator: EventPropagator,
    combat: CombatSystem,
    attention: AttentionScheduler,
    queues: BTreeMap<String, AgentEventQueue>,
    clock: WorldClock,
    clock_notices: broadcast::Receiver<ClockNotice>,
    backend: Arc<dyn DecisionBackend>,
    pending_commands: Vec<Command>,
    command_counter: u64,
    sinks: BTreeMap<String, Box<dyn DeliverySink>>,
    event_log: Vec<GameEvent>,
    results: Vec<CommandResult>,
}

impl GameWorld {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(config, Arc::new(NullBackend))
    }

    pub fn with_backend(config: EngineConfig, backend: Arc<dyn DecisionBackend>) -> Self {
        let attention = AttentionScheduler::new(
            config.seed,
            config.max_concurrent_decisions,
            config.idle_window_ms,
        );
        let clock = WorldClock::new(config.clock_speed_factor);
        let clock_notices = clock.subscribe();
        Self {
            config,
            now_ms: 0,
            tick_count: 0,
            sequence_in_tick: 0,
            rooms: BTreeMap::new(),
            characters: BTreeMap::new(),
            occupancy: Occupancy::new(),
            graph: RoomGraph::new(),
            propagator: EventPropagator,
            combat: CombatSystem::new(),
            attention,
            queues: BTreeMap::new(),
            clock,
            clock_notices,
            backend,
            pending_commands: Vec::new(),
            command_counter: 0,
            sinks: BTreeMap::new(),
            event_log: Vec::new(),
            results: Vec::new(),
        }
    }

    // --- accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn clock(&self) -> &WorldClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut WorldClock {
        &mut self.clock
    }

    pub fn character(&self, character_id: &str) -> Option<&CharacterRecord> {
        self.characters.get(character_id)
    }

    pub fn characters(&self) -> &BTreeMap<String, CharacterRecord> {
        &self.characters
    }

    pub fn agent_queue(&self, agent_id: &str) -> Option<&AgentEventQueue> {
        self.queues.get(agent_id)
    }

    pub fn attention(&self) -> &AttentionScheduler {
        &self.attention
    }

    pub fn combat(&self) -> &CombatSystem {
        &self.combat
    }

    pub fn event_log(&self) -> &[GameEvent] {
        &self.event_log
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    // --- world assembly ---

    /// Load (or wholesale replace) the room set and rebuild the adjacency
    /// graph. Fails fast on topology errors: a wrong graph silently breaks
    /// every later propagation and targeting decision.
    pub fn load_rooms(&mut self, rooms: Vec<RoomRecord>) -> Result<(), TopologyError> {
        self.graph.build(&rooms)?;
        self.rooms = rooms
            .into_iter()
            .map(|room| (room.room_id.clone(), room))
            .collect();
        info!(rooms = self.graph.room_count(), "room graph rebuilt");
        Ok(())
    }

    /// Add a character to the world and announce their arrival. Agents get
    /// an event queue and a scheduler row.
    pub fn join_character(&mut self, record: CharacterRecord) {
        let character_id = record.character_id.clone();
        self.occupancy.register(
            &character_id,
            OccupantInfo {
                name: record.name.clone(),
                room_id: record.room_id.clone(),
                is_agent: record.is_agent,
                is_admin: record.is_admin,
            },
        );
        if record.is_agent {
            self.queues
                .entry(character_id.clone())
                .or_insert_with(|| AgentEventQueue::new(self.config.queue_window_ms));
            self.attention.touch(&character_id, self.now_ms);
        }
        let room_id = record.room_id.clone();
        let room_name = self
            .rooms
            .get(&room_id)
            .map(|room| room.name.clone())
            .unwrap_or_default();
        let actor_name = record.name.clone();
        self.characters.insert(character_id.clone(), record);
        self.emit_event_at(
            EventType::PlayerEntered,
            &room_id,
            Visibility::Room,
            vec![Self::character_actor(&character_id)],
            json!({ "actor_name": actor_name, "room_name": room_name }),
        );
    }

    /// Restore an agent's event queue from a persisted snapshot.
    pub fn restore_agent_queue(&mut self, agent_id: &str, queue: AgentEventQueue) {
        self.queues.insert(agent_id.to_string(), queue);
    }

    /// Attach the delivery sink for a live (non-agent) character.
    pub fn attach_sink(&mut self, character_id: &str, sink: Box<dyn DeliverySink>) {
        self.sinks.insert(character_id.to_string(), sink);
    }

    /// Remove a character entirely: occupancy, sink, queue, scheduler row.
    pub fn remove_character(&mut self, character_id: &str) {
        if let Some(record) = self.characters.get(character_id) {
            let room_id = record.room_id.clone();
            let actor_name = record.name.clone();
            self.emit_event_at(
                EventType::PlayerLeft,
                &room_id,
                Visibility::Room,
                vec![Self::character_actor(character_id)],
                json!({ "actor_name": actor_name }),
            );
        }
        self.characters.remove(character_id);
        self.occupancy.remove(character_id);
        self.sinks.remove(character_id);
        self.queues.remove(character_id);
        self.attention.remove(character_id);
        self.combat.disengage(character_id);
    }

    /// Operational notice. System events carry global range, so every
    /// connected occupant receives it regardless of distance.
    pub fn emit_system_broadcast(&mut self, message: &str) {
        self.emit_event_at(
            EventType::System,
            "",
            Visibility::Room,
            Vec::new(),
            json!({ "message": message }),
        );
    }

    // --- event emission and routing ---

    pub(crate) fn character_actor(character_id: &str) -> ActorRef {
        ActorRef {
            actor_id: character_id.to_string(),
            actor_kind: "character".to_string(),
        }
    }

    fn next_event_id(&mut self) -> String {
        self.sequence_in_tick += 1;
        format!("evt_{:06}_{:04}", self.tick_count, self.sequence_in_tick)
    }

    /// Build an event and route it immediately: players receive rendered
    /// text through their sink, agents get a queue entry plus a scheduling
    /// stimulus. An agent's own actions become context, never stimuli.
    pub(crate) fn emit_event_at(
        &mut self,
        event_type: EventType,
        origin_room_id: &str,
        visibility: Visibility,
        actors: Vec<ActorRef>,
        data: Value,
    ) {
        let event = GameEvent {
            event_id: self.next_event_id(),
            event_type,
            at_ms: self.now_ms,
            origin_room_id: origin_room_id.to_string(),
            visibility,
            actors,
            data,
        };
        // Combat pacing applies to every agent named in the event, the
        // initiator included, even though its own action is never a stimulus.
        if event.event_type.is_combat() {
            for actor in &event.actors {
                if self.queues.contains_key(&actor.actor_id) {
                    self.attention.note_combat(&actor.actor_id, self.now_ms);
                }
            }
        }
        let deliveries = self.propagator.broadcast(&event, &self.graph, &self.occupancy);
        for delivery in deliveries {
            if delivery.is_agent {
                if let Some(queue) = self.queues.get_mut(&delivery.recipient_id) {
                    queue.push_event(self.now_ms, delivery.text);
                }
                if event.actor_id() != Some(delivery.recipient_id.as_str()) {
                    let agent_name = self
                        .characters
                        .get(&delivery.recipient_id)
                        .map(|record| record.name.clone())
                        .unwrap_or_default();
                    self.attention
                        .observe(&delivery.recipient_id, &agent_name, &event, self.now_ms);
                }
            } else if let Some(sink) = self.sinks.get_mut(&delivery.recipient_id) {
                sink.deliver(&event, &delivery.text);
            }
        }
        self.event_log.push(event);
    }
}

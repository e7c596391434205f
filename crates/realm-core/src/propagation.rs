//! Range-limited event propagation.
//!
//! Given an event and the static range table, the propagator resolves the
//! recipient set (occupants of every room within the event type's hop
//! distance, or everyone for global scope, or just the actor for private
//! scope), renders a per-recipient perspective, and guarantees at most one
//! delivery per (event, recipient) pair.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{EventType, GameEvent, Visibility};

use crate::room_graph::RoomGraph;

// ---------------------------------------------------------------------------
// Range table
// ---------------------------------------------------------------------------

/// Hop distance an event type carries when broadcast with room visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopRange {
    /// 0 = origin room only.
    Hops(u32),
    /// Reaches every connected occupant.
    Global,
}

/// Static event-type → range mapping. Total over the closed enum, so every
/// event type has exactly one entry.
pub fn hop_range(event_type: EventType) -> HopRange {
    match event_type {
        EventType::Movement => HopRange::Hops(0),
        EventType::Speech => HopRange::Hops(0),
        EventType::Whisper => HopRange::Hops(0),
        EventType::Emote => HopRange::Hops(0),
        EventType::CombatHit => HopRange::Hops(0),
        EventType::CombatStart => HopRange::Hops(1),
        EventType::Death => HopRange::Hops(2),
        EventType::Shout => HopRange::Hops(3),
        EventType::Explosion => HopRange::Hops(5),
        EventType::AdminAction => HopRange::Hops(0),
        EventType::ItemPickup => HopRange::Hops(0),
        EventType::ItemDrop => HopRange::Hops(0),
        EventType::PlayerEntered => HopRange::Hops(0),
        EventType::PlayerLeft => HopRange::Hops(0),
        EventType::RoomDescription => HopRange::Hops(0),
        EventType::Ambient => HopRange::Hops(0),
        EventType::System => HopRange::Global,
    }
}

// ---------------------------------------------------------------------------
// Occupancy index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantInfo {
    pub name: String,
    pub room_id: String,
    pub is_agent: bool,
    pub is_admin: bool,
}

/// Room → occupant index, kept in sync with the character table by the
/// world on join, leave and movement.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    by_room: BTreeMap<String, BTreeSet<String>>,
    info: BTreeMap<String, OccupantInfo>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, character_id: &str, info: OccupantInfo) {
        self.by_room
            .entry(info.room_id.clone())
            .or_default()
            .insert(character_id.to_string());
        self.info.insert(character_id.to_string(), info);
    }

    pub fn remove(&mut self, character_id: &str) {
        if let Some(info) = self.info.remove(character_id) {
            if let Some(occupants) = self.by_room.get_mut(&info.room_id) {
                occupants.remove(character_id);
                if occupants.is_empty() {
                    self.by_room.remove(&info.room_id);
                }
            }
        }
    }

    pub fn move_occupant(&mut self, character_id: &str, to_room: &str) {
        let Some(mut info) = self.info.remove(character_id) else {
            return;
        };
        if let Some(occupants) = self.by_room.get_mut(&info.room_id) {
            occupants.remove(character_id);
            if occupants.is_empty() {
                self.by_room.remove(&info.room_id);
            }
        }
        info.room_id = to_room.to_string();
        self.register(character_id, info);
    }

    pub fn occupants_of(&self, room_id: &str) -> Vec<&str> {
        self.by_room
            .get(room_id)
            .map(|occupants| occupants.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn all_ids(&self) -> Vec<&str> {
        self.info.keys().map(String::as_str).collect()
    }

    pub fn info(&self, character_id: &str) -> Option<&OccupantInfo> {
        self.info.get(character_id)
    }
}

// ---------------------------------------------------------------------------
// Perspective rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    /// The acting entity's view ("You attack the goblin...").
    FirstPerson,
    /// Everyone else's view ("Alice attacks the goblin...").
    ThirdPerson,
    /// Unfiltered admin view.
    Omniscient,
}

fn data_str<'a>(event: &'a GameEvent, key: &str) -> &'a str {
    event.data.get(key).and_then(|value| value.as_str()).unwrap_or("")
}

fn data_i64(event: &GameEvent, key: &str) -> i64 {
    event.data.get(key).and_then(|value| value.as_i64()).unwrap_or(0)
}

/// Render an event for one recipient. Perspective is resolved per recipient,
/// not globally precomputed; `recipient_id` lets third-person renderings
/// specialize (a whisper's target hears the words, bystanders do not).
pub fn render_event(event: &GameEvent, perspective: Perspective, recipient_id: &str) -> String {
    let actor = data_str(event, "actor_name");
    let target = data_str(event, "target_name");
    let message = data_str(event, "message");

    let third = |recipient_id: &str| -> String {
        match event.event_type {
            EventType::Movement => format!("{actor} leaves {}.", data_str(event, "direction")),
            EventType::PlayerEntered => format!("{actor} arrives."),
            EventType::PlayerLeft => format!("{actor} has left the realm."),
            EventType::Speech => format!("{actor} says, \"{message}\""),
            EventType::Whisper => {
                let target_id = event
                    .actors
                    .get(1)
                    .map(|actor_ref| actor_ref.actor_id.as_str())
                    .unwrap_or("");
                if recipient_id == target_id {
                    format!("{actor} whispers, \"{message}\"")
                } else {
                    format!("{actor} whispers something to {target}.")
                }
            }
            EventType::Shout => format!("{actor} shouts, \"{message}\""),
            EventType::Emote => format!("{actor} {message}"),
            EventType::CombatStart => format!("{actor} attacks {target}!"),
            EventType::CombatHit => format!(
                "{actor} hits {target} for {} damage.",
                data_i64(event, "damage")
            ),
            EventType::Death => format!("{actor} has died."),
            EventType::ItemPickup => format!("{actor} picks up {}.", data_str(event, "item")),
            EventType::ItemDrop => format!("{actor} drops {}.", data_str(event, "item")),
            EventType::RoomDescription => data_str(event, "text").to_string(),
            EventType::System => message.to_string(),
            EventType::Ambient => data_str(event, "text").to_string(),
            EventType::Explosion => "An explosion echoes in the distance!".to_string(),
            EventType::AdminAction => format!("The air crackles as {actor} works unseen forces."),
        }
    };

    match perspective {
        Perspective::FirstPerson => match event.event_type {
            EventType::Movement => format!("You head {}.", data_str(event, "direction")),
            EventType::PlayerEntered => format!("You arrive in {}.", data_str(event, "room_name")),
            EventType::PlayerLeft => "You leave the realm.".to_string(),
            EventType::Speech => format!("You say, \"{message}\""),
            EventType::Whisper => format!("You whisper to {target}, \"{message}\""),
            EventType::Shout => format!("You shout, \"{message}\""),
            EventType::Emote => format!("You {message}"),
            EventType::CombatStart => format!("You attack {target}!"),
            EventType::CombatHit => format!(
                "You hit {target} for {} damage.",
                data_i64(event, "damage")
            ),
            EventType::Death => "You have died.".to_string(),
            EventType::ItemPickup => format!("You pick up {}.", data_str(event, "item")),
            EventType::ItemDrop => format!("You drop {}.", data_str(event, "item")),
            EventType::RoomDescription
            | EventType::System
            | EventType::Ambient
            | EventType::Explosion => third(recipient_id),
            EventType::AdminAction => format!("You invoke {}.", data_str(event, "action")),
        },
        Perspective::ThirdPerson => third(recipient_id),
        Perspective::Omniscient => {
            let type_tag = serde_json::to_string(&event.event_type)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string();
            format!("[{type_tag}@{}] {}", event.origin_room_id, third(recipient_id))
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery seam
// ---------------------------------------------------------------------------

/// The seam between propagation and presentation: a live connection pushes
/// immediately, while agent recipients are routed into their event queue by
/// the world instead of through a sink.
pub trait DeliverySink: Send {
    fn deliver(&mut self, event: &GameEvent, rendered: &str);
}

// ---------------------------------------------------------------------------
// EventPropagator
// ---------------------------------------------------------------------------

/// One resolved (event, recipient) delivery with its rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient_id: String,
    pub is_agent: bool,
    pub perspective: Perspective,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventPropagator;

impl EventPropagator {
    /// Resolve the recipient set for an event and render each recipient's
    /// perspective. Each recipient appears at most once even when reachable
    /// through multiple equal-distance paths or overlapping scopes.
    pub fn broadcast(
        &self,
        event: &GameEvent,
        graph: &RoomGraph,
        occupancy: &Occupancy,
    ) -> Vec<Delivery> {
        let actor_id = event.actor_id().unwrap_or("");

        let mut recipients: BTreeSet<String> = BTreeSet::new();
        match event.visibility {
            Visibility::Private => {
                if occupancy.info(actor_id).is_some() {
                    recipients.insert(actor_id.to_string());
                }
            }
            Visibility::Global => {
                for id in occupancy.all_ids() {
                    recipients.insert(id.to_string());
                }
            }
            Visibility::Room => match hop_range(event.event_type) {
                HopRange::Global => {
                    for id in occupancy.all_ids() {
                        recipients.insert(id.to_string());
                    }
                }
                HopRange::Hops(hops) => {
                    for room_id in graph.rooms_within(&event.origin_room_id, hops) {
                        for id in occupancy.occupants_of(&room_id) {
                            recipients.insert(id.to_string());
                        }
                    }
                }
            },
        }

        recipients
            .into_iter()
            .filter_map(|recipient_id| {
                let info = occupancy.info(&recipient_id)?;
                let perspective = if recipient_id == actor_id {
                    Perspective::FirstPerson
                } else if info.is_admin {
                    Perspective::Omniscient
                } else {
                    Perspective::ThirdPerson
                };
                let text = render_event(event, perspective, &recipient_id);
                Some(Delivery {
                    is_agent: info.is_agent,
                    recipient_id,
                    perspective,
                    text,
                })
            })
            .collect()
    }
}

//! Command queue and interpreter.
//!
//! Commands accumulate asynchronously between ticks; at the start of the
//! command slot the pending list is swapped for an empty one and the
//! captured batch executes strictly sequentially in arrival order. That
//! sequential drain is the only ordering guarantee keeping two same-tick
//! commands from racing on shared character state. Validation failures
//! are command-local: they produce a failed result and never interrupt
//! the tick or the rest of the batch.

use contracts::{Command, CommandResult, CommandSource, EventType, Visibility};
use serde_json::json;
use tracing::debug;

use super::GameWorld;

const DIRECTIONS: [&str; 6] = ["north", "south", "east", "west", "up", "down"];

impl GameWorld {
    /// Queue a command for the next tick's batch. Returns the command id.
    pub fn enqueue_command(
        &mut self,
        source: CommandSource,
        actor_id: &str,
        raw: &str,
    ) -> String {
        self.command_counter += 1;
        let command_id = format!("cmd_{:06}", self.command_counter);
        self.pending_commands.push(Command {
            command_id: command_id.clone(),
            source,
            actor_id: actor_id.to_string(),
            raw: raw.to_string(),
            enqueued_at_ms: self.now_ms,
        });
        command_id
    }

    pub fn pending_command_count(&self) -> usize {
        self.pending_commands.len()
    }

    /// Swap out the pending list and execute the captured batch in order.
    pub(crate) fn drain_command_batch(&mut self) {
        let batch = std::mem::take(&mut self.pending_commands);
        for command in batch {
            let result = self.apply_command(&command);
            debug!(
                command_id = %result.command_id,
                ok = result.ok,
                actor_id = %command.actor_id,
                "command applied"
            );
            if command.source == CommandSource::Agent {
                if let Some(queue) = self.queues.get_mut(&command.actor_id) {
                    queue.push_self_output(self.now_ms, command.raw.clone());
                }
            }
            if !result.ok {
                self.deliver_feedback(&command.actor_id, &result.message);
            }
            self.results.push(result);
        }
    }

    /// Push a command-local failure message straight to the actor.
    fn deliver_feedback(&mut self, actor_id: &str, message: &str) {
        if let Some(queue) = self.queues.get_mut(actor_id) {
            queue.push_event(self.now_ms, message);
        } else if self.sinks.contains_key(actor_id) {
            let event = contracts::GameEvent {
                event_id: self.next_event_id(),
                event_type: EventType::System,
                at_ms: self.now_ms,
                origin_room_id: String::new(),
                visibility: Visibility::Private,
                actors: vec![Self::character_actor(actor_id)],
                data: json!({ "message": message }),
            };
            if let Some(sink) = self.sinks.get_mut(actor_id) {
                sink.deliver(&event, message);
            }
        }
    }

    fn ok_result(command: &Command, message: impl Into<String>) -> CommandResult {
        CommandResult {
            command_id: command.command_id.clone(),
            ok: true,
            message: message.into(),
        }
    }

    fn failed_result(command: &Command, message: impl Into<String>) -> CommandResult {
        CommandResult {
            command_id: command.command_id.clone(),
            ok: false,
            message: message.into(),
        }
    }

    fn apply_command(&mut self, command: &Command) -> CommandResult {
        let Some(actor) = self.characters.get(&command.actor_id) else {
            return Self::failed_result(command, "You are not in the world.");
        };
        if !actor.alive {
            return Self::failed_result(command, "You are dead.");
        }

        let raw = command.raw.trim();
        let mut words = raw.split_whitespace();
        let Some(verb) = words.next() else {
            return Self::failed_result(command, "Say what?");
        };
        let verb = verb.to_lowercase();
        let rest: Vec<&str> = words.collect();

        match verb.as_str() {
            direction if DIRECTIONS.contains(&direction) => {
                self.handle_move(command, direction)
            }
            "go" => match rest.first() {
                Some(direction) => self.handle_move(command, &direction.to_lowercase()),
                None => Self::failed_result(command, "Go where?"),
            },
            "say" => self.handle_speech(command, EventType::Speech, &rest.join(" ")),
            "shout" => self.handle_speech(command, EventType::Shout, &rest.join(" ")),
            "emote" => self.handle_speech(command, EventType::Emote, &rest.join(" ")),
            "whisper" => match rest.split_first() {
                Some((target_name, message_words)) if !message_words.is_empty() => {
                    self.handle_whisper(command, target_name, &message_words.join(" "))
                }
                _ => Self::failed_result(command, "Whisper to whom, and what?"),
            },
            "attack" => match rest.first() {
                Some(target_name) => self.handle_attack(command, target_name),
                None => Self::failed_result(command, "Attack whom?"),
            },
            "look" => self.handle_look(command),
            _ => Self::failed_result(command, format!("Unknown command: {verb}")),
        }
    }

    // --- verb handlers ---

    fn handle_move(&mut self, command: &Command, direction: &str) -> CommandResult {
        let Some(actor) = self.characters.get(&command.actor_id) else {
            return Self::failed_result(command, "You are not in the world.");
        };
        let origin_room_id = actor.room_id.clone();
        let actor_name = actor.name.clone();

        let Some(room) = self.rooms.get(&origin_room_id) else {
            return Self::failed_result(command, "You are nowhere.");
        };
        let Some(destination_id) = room.exits.get(direction).cloned() else {
            return Self::failed_result(command, format!("You cannot go {direction}."));
        };
        let destination_name = self
            .rooms
            .get(&destination_id)
            .map(|room| room.name.clone())
            .unwrap_or_default();

        // Departure is visible in the origin room before the move lands.
        self.emit_event_at(
            EventType::Movement,
            &origin_room_id,
            Visibility::Room,
            vec![Self::character_actor(&command.actor_id)],
            json!({ "actor_name": actor_name, "direction": direction }),
        );

        self.occupancy.move_occupant(&command.actor_id, &destination_id);
        if let Some(record) = self.characters.get_mut(&command.actor_id) {
            record.room_id = destination_id.clone();
        }

        self.emit_event_at(
            EventType::PlayerEntered,
            &destination_id,
            Visibility::Room,
            vec![Self::character_actor(&command.actor_id)],
            json!({ "actor_name": actor_name, "room_name": destination_name }),
        );
        self.describe_room_to(&command.actor_id);
        Self::ok_result(command, format!("You head {direction}."))
    }

    fn handle_speech(
        &mut self,
        command: &Command,
        event_type: EventType,
        message: &str,
    ) -> CommandResult {
        if message.is_empty() {
            return Self::failed_result(command, "Say what?");
        }
        let Some(actor) = self.characters.get(&command.actor_id) else {
            return Self::failed_result(command, "You are not in the world.");
        };
        let origin_room_id = actor.room_id.clone();
        let actor_name = actor.name.clone();
        self.emit_event_at(
            event_type,
            &origin_room_id,
            Visibility::Room,
            vec![Self::character_actor(&command.actor_id)],
            json!({ "actor_name": actor_name, "message": message }),
        );
        Self::ok_result(command, "")
    }

    fn handle_whisper(
        &mut self,
        command: &Command,
        target_name: &str,
        message: &str,
    ) -> CommandResult {
        let Some(actor) = self.characters.get(&command.actor_id) else {
            return Self::failed_result(command, "You are not in the world.");
        };
        let origin_room_id = actor.room_id.clone();
        let actor_name = actor.name.clone();

        let Some(target) = self.find_in_room(&origin_room_id, target_name, &command.actor_id)
        else {
            return Self::failed_result(command, format!("There is no {target_name} here."));
        };
        let (target_id, target_name) = target;
        self.emit_event_at(
            EventType::Whisper,
            &origin_room_id,
            Visibility::Room,
            vec![
                Self::character_actor(&command.actor_id),
                Self::character_actor(&target_id),
            ],
            json!({ "actor_name": actor_name, "target_name": target_name, "message": message }),
        );
        Self::ok_result(command, "")
    }

    fn handle_attack(&mut self, command: &Command, target_name: &str) -> CommandResult {
        let Some(actor) = self.characters.get(&command.actor_id) else {
            return Self::failed_result(command, "You are not in the world.");
        };
        let origin_room_id = actor.room_id.clone();
        let actor_name = actor.name.clone();

        let Some((target_id, target_name)) =
            self.find_in_room(&origin_room_id, target_name, &command.actor_id)
        else {
            return Self::failed_result(command, format!("There is no {target_name} here."));
        };
        let target_alive = self
            .characters
            .get(&target_id)
            .map_or(false, |record| record.alive);
        if !target_alive {
            return Self::failed_result(command, format!("{target_name} is already dead."));
        }

        let newly_engaged = self.combat.engage(&command.actor_id, &target_id, 1.0);
        if newly_engaged {
            self.emit_event_at(
                EventType::CombatStart,
                &origin_room_id,
                Visibility::Room,
                vec![
                    Self::character_actor(&command.actor_id),
                    Self::character_actor(&target_id),
                ],
                json!({ "actor_name": actor_name, "target_name": target_name }),
            );
        }
        Self::ok_result(command, format!("You attack {target_name}!"))
    }

    fn handle_look(&mut self, command: &Command) -> CommandResult {
        self.describe_room_to(&command.actor_id);
        Self::ok_result(command, "")
    }

    // --- helpers ---

    /// Case-insensitive name lookup among living-or-dead occupants of a
    /// room, excluding the searcher.
    fn find_in_room(
        &self,
        room_id: &str,
        name: &str,
        exclude_id: &str,
    ) -> Option<(String, String)> {
        let wanted = name.to_lowercase();
        for occupant_id in self.occupancy.occupants_of(room_id) {
            if occupant_id == exclude_id {
                continue;
            }
            if let Some(record) = self.characters.get(occupant_id) {
                if record.name.to_lowercase() == wanted {
                    return Some((record.character_id.clone(), record.name.clone()));
                }
            }
        }
        None
    }

    /// Private room description: name, other occupants, exits.
    fn describe_room_to(&mut self, character_id: &str) {
        let Some(actor) = self.characters.get(character_id) else {
            return;
        };
        let room_id = actor.room_id.clone();
        let Some(room) = self.rooms.get(&room_id) else {
            return;
        };

        let mut lines = vec![room.name.clone()];
        let others: Vec<String> = self
            .occupancy
            .occupants_of(&room_id)
            .into_iter()
            .filter(|occupant_id| *occupant_id != character_id)
            .filter_map(|occupant_id| self.characters.get(occupant_id))
            .map(|record| {
                if record.alive {
                    record.name.clone()
                } else {
                    format!("the corpse of {}", record.name)
                }
            })
            .collect();
        if !others.is_empty() {
            lines.push(format!("You see: {}.", others.join(", ")));
        }
        let exits: Vec<&str> = room.exits.keys().map(String::as_str).collect();
        if exits.is_empty() {
            lines.push("There are no obvious exits.".to_string());
        } else {
            lines.push(format!("Exits: {}.", exits.join(", ")));
        }

        self.emit_event_at(
            EventType::RoomDescription,
            &room_id,
            Visibility::Private,
            vec![Self::character_actor(character_id)],
            json!({ "text": lines.join(" ") }),
        );
    }
}

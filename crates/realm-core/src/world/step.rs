//! Per-tick fan-out.
//!
//! One cooperative loop advances every subsystem in a fixed order: clock,
//! command batch, combat rounds, decision completions, decision launches.
//! The tick never awaits a decision call; it only launches tasks and
//! collects whatever finished since the previous tick.

use std::sync::Arc;

use contracts::{CommandSource, DecisionContext, EventType, Visibility};
use serde_json::json;
use tracing::trace;

use super::GameWorld;
use crate::clock::ClockNotice;
use crate::combat::RoundReport;

impl GameWorld {
    /// Advance the world by one tick of `delta_ms` real milliseconds.
    pub fn tick(&mut self, delta_ms: u64) {
        self.tick_count += 1;
        self.sequence_in_tick = 0;
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        self.clock.advance(delta_ms);
        self.drain_clock_notices();

        self.drain_command_batch();

        let reports = self.combat.tick(delta_ms, &mut self.characters);
        for report in reports {
            self.emit_round(report);
        }

        // Decisions that finished since last tick re-enter the command
        // pipeline; they execute in next tick's batch.
        let decisions = self.attention.drain_outcomes(self.now_ms);
        for (agent_id, decision) in decisions {
            let alive = self
                .characters
                .get(&agent_id)
                .map_or(false, |record| record.alive);
            if alive {
                self.enqueue_command(CommandSource::Agent, &agent_id, &decision.command);
            }
        }

        self.launch_due_decisions();
        trace!(tick = self.tick_count, now_ms = self.now_ms, "tick complete");
    }

    /// Hour boundaries become world-wide ambient color; minute notices
    /// are drained but stay internal.
    fn drain_clock_notices(&mut self) {
        use tokio::sync::broadcast::error::TryRecvError;
        let mut hours = Vec::new();
        loop {
            match self.clock_notices.try_recv() {
                Ok(ClockNotice::HourBoundary { game_hour }) => hours.push(game_hour),
                Ok(ClockNotice::MinuteBoundary { .. }) => {}
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        for game_hour in hours {
            self.emit_event_at(
                EventType::Ambient,
                "",
                Visibility::Global,
                Vec::new(),
                json!({ "text": format!("A distant bell tolls hour {game_hour}.") }),
            );
        }
    }

    fn emit_round(&mut self, report: RoundReport) {
        self.emit_event_at(
            EventType::CombatHit,
            &report.room_id,
            Visibility::Room,
            vec![
                Self::character_actor(&report.attacker_id),
                Self::character_actor(&report.target_id),
            ],
            json!({
                "actor_name": report.attacker_name,
                "target_name": report.target_name,
                "damage": report.damage,
                "target_hp": report.target_hp,
            }),
        );
        if report.lethal {
            self.emit_event_at(
                EventType::Death,
                &report.room_id,
                Visibility::Room,
                vec![Self::character_actor(&report.target_id)],
                json!({ "actor_name": report.target_name }),
            );
            // The dead make no further decisions.
            self.attention.remove(&report.target_id);
        }
    }

    fn launch_due_decisions(&mut self) {
        for agent_id in self.attention.due_agents(self.now_ms) {
            let Some(record) = self.characters.get(&agent_id) else {
                self.attention.remove(&agent_id);
                continue;
            };
            if !record.alive {
                self.attention.remove(&agent_id);
                continue;
            }
            let agent_name = record.name.clone();
            let (recent_events, recent_outputs) = match self.queues.get_mut(&agent_id) {
                Some(queue) => {
                    queue.purge(self.now_ms);
                    (queue.recent_events(), queue.recent_outputs())
                }
                None => (Vec::new(), Vec::new()),
            };
            let in_combat = self.attention.is_in_combat(&agent_id, self.now_ms);
            let context = DecisionContext {
                agent_id: agent_id.clone(),
                agent_name,
                in_combat,
                now_ms: self.now_ms,
                recent_events,
                recent_outputs,
            };
            self.attention
                .launch(&agent_id, context, Arc::clone(&self.backend), self.now_ms);
        }
    }
}

//! Deterministic attack resolution and death cascade.
//!
//! Trackers are keyed by attacker id. Each tracker carries a gauge that
//! fills at `speed` per millisecond; a round resolves every time it
//! crosses the round cost. Round resolution rechecks live state and
//! silently disengages stale pairings instead of erroring, because
//! nothing prevents a target from dying or walking away between rounds.

use std::collections::BTreeMap;

use contracts::CharacterRecord;

pub const MINIMUM_DAMAGE: i64 = 1;
/// Gauge units per round. At the default speed of 1.0 per millisecond
/// this is one round every three seconds.
pub const ROUND_COST: f64 = 3_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CombatantState {
    pub target_id: String,
    pub gauge: f64,
    pub speed: f64,
}

/// One resolved round, ready to be turned into `combat_hit` (and, when
/// lethal, `death`) events by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub attacker_id: String,
    pub attacker_name: String,
    pub target_id: String,
    pub target_name: String,
    pub room_id: String,
    pub damage: i64,
    pub target_hp: i64,
    pub lethal: bool,
}

#[derive(Debug, Default)]
pub struct CombatSystem {
    trackers: BTreeMap<String, CombatantState>,
}

impl CombatSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage an attacker on a target. Returns true when this starts a
    /// new engagement (as opposed to repeating the current target, which
    /// leaves the running gauge untouched). Retargeting resets the gauge.
    pub fn engage(&mut self, attacker_id: &str, target_id: &str, speed: f64) -> bool {
        if let Some(existing) = self.trackers.get(attacker_id) {
            if existing.target_id == target_id {
                return false;
            }
        }
        self.trackers.insert(
            attacker_id.to_string(),
            CombatantState {
                target_id: target_id.to_string(),
                gauge: 0.0,
                speed,
            },
        );
        true
    }

    pub fn disengage(&mut self, attacker_id: &str) {
        self.trackers.remove(attacker_id);
    }

    pub fn target_of(&self, attacker_id: &str) -> Option<&str> {
        self.trackers
            .get(attacker_id)
            .map(|state| state.target_id.as_str())
    }

    pub fn is_engaged(&self, attacker_id: &str) -> bool {
        self.trackers.contains_key(attacker_id)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Ids of everyone currently attacking the given character.
    pub fn attackers_of(&self, target_id: &str) -> Vec<String> {
        self.trackers
            .iter()
            .filter(|(_, state)| state.target_id == target_id)
            .map(|(attacker_id, _)| attacker_id.clone())
            .collect()
    }

    /// Death cascade: drop the attacker's own tracker, the victim's
    /// tracker, and every tracker targeting the victim.
    fn cascade(&mut self, attacker_id: &str, victim_id: &str) {
        self.trackers.remove(attacker_id);
        self.trackers.remove(victim_id);
        self.trackers
            .retain(|_, state| state.target_id != victim_id);
    }

    /// Advance every tracker's gauge and resolve the rounds that fire.
    /// Mutates HP and alive flags in place; the caller turns the returned
    /// reports into events.
    pub fn tick(
        &mut self,
        delta_ms: u64,
        characters: &mut BTreeMap<String, CharacterRecord>,
    ) -> Vec<RoundReport> {
        let mut reports = Vec::new();
        let attacker_ids: Vec<String> = self.trackers.keys().cloned().collect();

        for attacker_id in attacker_ids {
            // Skip trackers removed by an earlier cascade this tick.
            let Some(state) = self.trackers.get_mut(&attacker_id) else {
                continue;
            };
            state.gauge += state.speed * delta_ms as f64;

            while let Some(state) = self.trackers.get_mut(&attacker_id) {
                if state.gauge < ROUND_COST {
                    break;
                }
                state.gauge -= ROUND_COST;
                let target_id = state.target_id.clone();

                let valid = match (characters.get(&attacker_id), characters.get(&target_id)) {
                    (Some(attacker), Some(target)) => {
                        attacker.alive && target.alive && attacker.room_id == target.room_id
                    }
                    _ => false,
                };
                if !valid {
                    // Stale pairing: disengage both ends, no event.
                    self.trackers.remove(&attacker_id);
                    self.trackers.remove(&target_id);
                    break;
                }

                let (attacker_name, attacker_power, room_id) = {
                    let attacker = &characters[&attacker_id];
                    (attacker.name.clone(), attacker.power, attacker.room_id.clone())
                };
                let Some(target) = characters.get_mut(&target_id) else {
                    break;
                };
                let damage = (attacker_power - target.defense).max(MINIMUM_DAMAGE);
                target.hp = (target.hp - damage).max(0);
                let lethal = target.hp == 0;
                if lethal {
                    target.alive = false;
                }
                reports.push(RoundReport {
                    attacker_id: attacker_id.clone(),
                    attacker_name,
                    target_id: target_id.clone(),
                    target_name: target.name.clone(),
                    room_id,
                    damage,
                    target_hp: target.hp,
                    lethal,
                });
                if lethal {
                    self.cascade(&attacker_id, &target_id);
                    break;
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: &str, room: &str, hp: i64, power: i64, defense: i64) -> CharacterRecord {
        CharacterRecord {
            character_id: id.to_string(),
            name: id.trim_start_matches("char:").to_string(),
            room_id: room.to_string(),
            hp,
            max_hp: hp,
            power,
            defense,
            alive: true,
            is_agent: false,
            is_admin: false,
        }
    }

    fn arena(records: Vec<CharacterRecord>) -> BTreeMap<String, CharacterRecord> {
        records
            .into_iter()
            .map(|record| (record.character_id.clone(), record))
            .collect()
    }

    #[test]
    fn round_fires_once_gauge_crosses_cost() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 5),
            character("char:bob", "r0", 20, 10, 5),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        assert!(combat.tick(2_999, &mut characters).is_empty());
        let reports = combat.tick(1, &mut characters);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].damage, 5);
        assert_eq!(reports[0].target_hp, 15);
    }

    #[test]
    fn damage_is_power_minus_defense() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 0),
            character("char:bob", "r0", 20, 0, 5),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        let reports = combat.tick(3_000, &mut characters);
        assert_eq!(reports[0].damage, 5);
        assert_eq!(characters["char:bob"].hp, 15);
    }

    #[test]
    fn damage_clamps_to_minimum() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:weak", "r0", 20, 3, 0),
            character("char:tank", "r0", 20, 0, 10),
        ]);
        combat.engage("char:weak", "char:tank", 1.0);
        let reports = combat.tick(3_000, &mut characters);
        assert_eq!(reports[0].damage, MINIMUM_DAMAGE);
        assert_eq!(characters["char:tank"].hp, 19);
    }

    #[test]
    fn lethal_hit_clamps_hp_and_marks_dead_once() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 0),
            character("char:bob", "r0", 5, 0, 0),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        // Enough gauge for two rounds, but the pairing stops at the kill.
        let reports = combat.tick(6_000, &mut characters);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].lethal);
        assert_eq!(reports[0].target_hp, 0);
        assert_eq!(characters["char:bob"].hp, 0);
        assert!(!characters["char:bob"].alive);
        assert_eq!(combat.tracker_count(), 0);
    }

    #[test]
    fn death_cascade_removes_trackers_targeting_victim() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 0),
            character("char:bob", "r0", 5, 2, 0),
            character("char:carol", "r0", 20, 1, 0),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        combat.engage("char:bob", "char:alice", 1.0);
        combat.engage("char:carol", "char:bob", 0.1); // slow, never fires
        assert_eq!(combat.attackers_of("char:bob").len(), 2);

        let reports = combat.tick(3_000, &mut characters);
        let lethal: Vec<_> = reports.iter().filter(|report| report.lethal).collect();
        assert_eq!(lethal.len(), 1);
        assert_eq!(lethal[0].target_id, "char:bob");
        // Alice's, bob's, and carol's trackers are all gone.
        assert_eq!(combat.tracker_count(), 0);
    }

    #[test]
    fn different_room_disengages_both_silently() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 0),
            character("char:bob", "r1", 20, 10, 0),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        combat.engage("char:bob", "char:alice", 1.0);
        let reports = combat.tick(3_000, &mut characters);
        assert!(reports.is_empty());
        assert_eq!(combat.tracker_count(), 0);
    }

    #[test]
    fn missing_target_disengages_without_event() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![character("char:alice", "r0", 20, 10, 0)]);
        combat.engage("char:alice", "char:ghost", 1.0);
        let reports = combat.tick(3_000, &mut characters);
        assert!(reports.is_empty());
        assert!(!combat.is_engaged("char:alice"));
    }

    #[test]
    fn dead_attacker_disengages() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 20, 10, 0),
            character("char:bob", "r0", 20, 10, 0),
        ]);
        characters.get_mut("char:alice").unwrap().alive = false;
        combat.engage("char:alice", "char:bob", 1.0);
        assert!(combat.tick(3_000, &mut characters).is_empty());
        assert!(!combat.is_engaged("char:alice"));
    }

    #[test]
    fn engage_same_target_twice_is_not_a_new_engagement() {
        let mut combat = CombatSystem::new();
        assert!(combat.engage("char:alice", "char:bob", 1.0));
        assert!(!combat.engage("char:alice", "char:bob", 1.0));
        assert!(combat.engage("char:alice", "char:carol", 1.0));
        assert_eq!(combat.target_of("char:alice"), Some("char:carol"));
    }

    #[test]
    fn gauge_remainder_carries_between_ticks() {
        let mut combat = CombatSystem::new();
        let mut characters = arena(vec![
            character("char:alice", "r0", 100, 10, 5),
            character("char:bob", "r0", 100, 10, 5),
        ]);
        combat.engage("char:alice", "char:bob", 1.0);
        // 4500ms = one round plus half a gauge; next 1500ms fires again.
        assert_eq!(combat.tick(4_500, &mut characters).len(), 1);
        assert_eq!(combat.tick(1_500, &mut characters).len(), 1);
    }
}

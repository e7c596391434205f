//! Fixed-cadence tick driver.
//!
//! Drives the world with a constant simulated delta equal to the
//! configured tick interval, which keeps runs reproducible regardless of
//! wall-clock jitter. Missed deadlines delay rather than burst.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::world::GameWorld;

/// Run the world for a fixed number of ticks at the configured cadence.
pub async fn run_ticks(world: &mut GameWorld, ticks: u64) {
    let interval_ms = world.config().tick_interval_ms.max(1);
    let mut interval = time::interval(Duration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(ticks, interval_ms, "tick loop starting");
    for _ in 0..ticks {
        interval.tick().await;
        world.tick(interval_ms);
    }
    debug!(now_ms = world.now_ms(), "tick loop finished");
}

/// Advance the world by `ticks` ticks without wall-clock pacing, yielding
/// between ticks so in-flight decision tasks get to run and complete.
pub async fn step_n(world: &mut GameWorld, ticks: u64) {
    let interval_ms = world.config().tick_interval_ms.max(1);
    for _ in 0..ticks {
        world.tick(interval_ms);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EngineConfig;

    #[tokio::test(start_paused = true)]
    async fn ticks_advance_simulated_time_by_fixed_deltas() {
        let mut world = GameWorld::new(EngineConfig::default());
        run_ticks(&mut world, 8).await;
        assert_eq!(world.tick_count(), 8);
        assert_eq!(world.now_ms(), 8 * world.config().tick_interval_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ticks_is_a_no_op() {
        let mut world = GameWorld::new(EngineConfig::default());
        run_ticks(&mut world, 0).await;
        assert_eq!(world.now_ms(), 0);
    }

    #[tokio::test]
    async fn step_n_matches_paced_deltas() {
        let mut world = GameWorld::new(EngineConfig::default());
        step_n(&mut world, 16).await;
        assert_eq!(world.tick_count(), 16);
        assert_eq!(world.now_ms(), 16 * world.config().tick_interval_ms);
    }
}

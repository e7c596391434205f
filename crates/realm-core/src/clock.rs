//! Scaled virtual world clock.
//!
//! Accumulates `delta_ms × speed_factor` game-seconds each tick and emits
//! typed boundary notices to subscribers whenever a game minute or hour is
//! crossed. The clock can be paused and resumed without losing accumulated
//! fractional game time.

use tokio::sync::broadcast;

/// Boundary crossing notice. Subscribers receive one notice per boundary
/// crossed, minutes before hours within the same advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockNotice {
    MinuteBoundary { game_minute: u64 },
    HourBoundary { game_hour: u64 },
}

#[derive(Debug)]
pub struct WorldClock {
    /// Game seconds elapsed per real second.
    speed_factor: f64,
    /// Total accumulated game time in seconds, fraction included.
    game_seconds: f64,
    paused: bool,
    notices: broadcast::Sender<ClockNotice>,
}

impl WorldClock {
    pub fn new(speed_factor: f64) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            speed_factor: speed_factor.max(0.0),
            game_seconds: 0.0,
            paused: false,
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClockNotice> {
        self.notices.subscribe()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Total elapsed game seconds, whole part.
    pub fn game_seconds(&self) -> u64 {
        self.game_seconds as u64
    }

    pub fn game_minute(&self) -> u64 {
        self.game_seconds() / 60
    }

    pub fn game_hour(&self) -> u64 {
        self.game_seconds() / 3_600
    }

    /// Advance by a real-time delta. No-op while paused. Emits one notice
    /// per minute and hour boundary crossed by this advance.
    pub fn advance(&mut self, delta_ms: u64) {
        if self.paused || delta_ms == 0 {
            return;
        }
        let before_minutes = self.game_minute();
        let before_hours = self.game_hour();

        self.game_seconds += (delta_ms as f64 / 1_000.0) * self.speed_factor;

        for game_minute in (before_minutes + 1)..=self.game_minute() {
            let _ = self.notices.send(ClockNotice::MinuteBoundary { game_minute });
        }
        for game_hour in (before_hours + 1)..=self.game_hour() {
            let _ = self.notices.send(ClockNotice::HourBoundary { game_hour });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_scaled_game_time() {
        let mut clock = WorldClock::new(60.0);
        clock.advance(1_000);
        assert_eq!(clock.game_seconds(), 60);
        assert_eq!(clock.game_minute(), 1);
    }

    #[test]
    fn fractional_time_survives_across_small_ticks() {
        let mut clock = WorldClock::new(60.0);
        // 250ms real ticks carry 15 game-seconds each; four make a minute.
        for _ in 0..4 {
            clock.advance(250);
        }
        assert_eq!(clock.game_minute(), 1);
    }

    #[test]
    fn pause_stops_time_and_resume_keeps_fraction() {
        let mut clock = WorldClock::new(60.0);
        clock.advance(750); // 45 game-seconds
        clock.pause();
        clock.advance(10_000);
        assert_eq!(clock.game_seconds(), 45);
        clock.resume();
        clock.advance(250); // the remaining 15 game-seconds
        assert_eq!(clock.game_minute(), 1);
    }

    #[test]
    fn minute_boundary_notice_is_emitted_once() {
        let mut clock = WorldClock::new(60.0);
        let mut notices = clock.subscribe();
        clock.advance(1_000);
        assert_eq!(
            notices.try_recv().ok(),
            Some(ClockNotice::MinuteBoundary { game_minute: 1 })
        );
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn hour_crossing_emits_minutes_then_hour() {
        let mut clock = WorldClock::new(3_600.0);
        let mut notices = clock.subscribe();
        clock.advance(1_000); // one full game hour in one real second
        let mut minutes = 0;
        let mut hours = 0;
        while let Ok(notice) = notices.try_recv() {
            match notice {
                ClockNotice::MinuteBoundary { .. } => minutes += 1,
                ClockNotice::HourBoundary { game_hour } => {
                    hours += 1;
                    assert_eq!(game_hour, 1);
                }
            }
        }
        assert_eq!(minutes, 60);
        assert_eq!(hours, 1);
    }

    #[test]
    fn advance_with_no_subscribers_is_fine() {
        let mut clock = WorldClock::new(60.0);
        clock.advance(120_000);
        assert_eq!(clock.game_minute(), 120);
    }
}

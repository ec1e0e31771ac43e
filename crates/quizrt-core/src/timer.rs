//! Attempt countdown.
//!
//! The remaining time is derived from the wall-clock distance to the start
//! instant rather than decremented per callback, so ticks missed while the
//! process was suspended are caught up on the next one.

use tokio::time::Instant;

/// What a single tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Nothing changed since the previous tick, or the countdown already expired.
    Idle,
    /// Remaining time decreased to the carried value.
    Decrement { remaining: u64 },
    /// Remaining time reached zero. Emitted exactly once.
    Expired,
}

/// Countdown seeded from the server-supplied remaining time.
#[derive(Debug, Clone)]
pub struct Countdown {
    initial: u64,
    started_at: Instant,
    remaining: u64,
    expired: bool,
}

impl Countdown {
    /// Start counting down `remaining_secs` from `now`.
    pub fn start(remaining_secs: u64, now: Instant) -> Self {
        Self {
            initial: remaining_secs,
            started_at: now,
            remaining: remaining_secs,
            expired: false,
        }
    }

    /// Seconds left as of the last tick.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Recompute the remaining time at `now`.
    pub fn tick(&mut self, now: Instant) -> TimerEvent {
        if self.expired {
            return TimerEvent::Idle;
        }

        let elapsed = now.saturating_duration_since(self.started_at).as_secs();
        let remaining = self.initial.saturating_sub(elapsed);

        if remaining == 0 {
            self.remaining = 0;
            self.expired = true;
            return TimerEvent::Expired;
        }
        if remaining < self.remaining {
            self.remaining = remaining;
            return TimerEvent::Decrement { remaining };
        }
        TimerEvent::Idle
    }
}

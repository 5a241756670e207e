use std::time::{Duration, Instant};

/// A periodic action tracked by its next due instant.
///
/// The due instant advances by whole periods, so late ticks do not shift the
/// cadence. If the loop falls more than one period behind, the missed
/// firings collapse into one and the schedule restarts from `now`.
#[derive(Debug, Clone)]
pub struct Periodic {
    period: Duration,
    next_due: Instant,
}

impl Periodic {
    /// First firing is one period after `now`.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now + period,
        }
    }

    /// First firing is at `now`.
    pub fn immediate(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Returns true and advances the schedule if the action is due.
    pub fn fire(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_due += self.period;
        if self.next_due <= now {
            self.next_due = now + self.period;
        }
        true
    }
}

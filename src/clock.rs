//! Clock port. Every engine reads "now" through this so SLA maths can be pinned in tests.
use super::types::TimeStamp;
use chrono::Duration;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp {
        TimeStamp::new()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<TimeStamp>,
}

impl ManualClock {
    pub fn new(start: TimeStamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }
    pub fn set(&self, to: TimeStamp) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = current.plus(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeStamp {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = TimeStamp::new_with(2026, 3, 2, 8, 0, 0);
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(90));

        assert_eq!(clock.now(), TimeStamp::new_with(2026, 3, 2, 9, 30, 0));
    }
}

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Source of timestamps for joins, requests and performances.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that advances a fixed step every time it is read,
/// so consecutive events never share a timestamp.
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    step_millis: i64,
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::seconds(1))
    }

    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            start,
            step_millis: step.num_milliseconds(),
            ticks: AtomicI64::new(0),
        }
    }

    /// Jump ahead without producing a reading.
    pub fn advance(&self, by: Duration) {
        let steps = if self.step_millis > 0 {
            by.num_milliseconds() / self.step_millis
        } else {
            0
        };
        self.ticks.fetch_add(steps, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::milliseconds(tick * self.step_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_ticks_on_every_read() {
        let start = Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::seconds(1));
        clock.advance(Duration::seconds(10));
        assert_eq!(clock.now(), start + Duration::seconds(12));
    }
}

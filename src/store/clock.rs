use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Strictly increasing timestamps at microsecond precision.
///
/// Wall-clock readings that go backwards (or repeat within a microsecond)
/// are bumped one microsecond past the last value handed out, so append
/// order and timestamp order never disagree.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    /// Same as [`now`](Self::now) with an explicit wall-clock reading.
    pub fn next_after(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let wall = truncate_micros(wall);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }
}

/// Postgres stores microseconds; truncating up front keeps round-trips exact.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skewed_wall_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let a = clock.next_after(t0);
        let b = clock.next_after(t0 - Duration::seconds(5));
        let c = clock.next_after(t0);
        assert!(a < b && b < c);
        assert_eq!(b - a, Duration::microseconds(1));
    }

    #[test]
    fn sub_microsecond_precision_is_dropped() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap_or_default();
        assert_eq!(truncate_micros(ts).timestamp_subsec_nanos(), 123_456_000);
    }
}

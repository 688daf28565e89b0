use chrono::{DateTime, Duration, Utc};

/// Wall-clock abstraction used to decide "now" when assembling a snapshot.
///
/// - now(): returns the current UTC instant
/// - minutes_since(): helper to compute elapsed minutes from an earlier instant
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Minutes elapsed since `earlier`, saturating at 0 when `earlier` is in the future.
    fn minutes_since(&self, earlier: DateTime<Utc>) -> f64 {
        let ms = (self.now() - earlier).num_milliseconds().max(0);
        ms as f64 / 60_000.0
    }
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant. Used for replaying recorded data and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Return a clock shifted by `d`.
    pub fn advanced(&self, d: Duration) -> Self {
        Self { at: self.at + d }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

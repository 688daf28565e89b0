//! Timeline helpers shared across the effect models.

use chrono::{DateTime, Duration, Utc};

/// Milliseconds per minute.
pub const MILLIS_PER_MIN: f64 = 60_000.0;

/// Signed minutes from `from` to `to`.
#[inline]
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_MIN
}

/// `t` shifted by a fractional number of minutes, rounded to the millisecond.
#[inline]
pub fn add_minutes(t: DateTime<Utc>, minutes: f64) -> DateTime<Utc> {
    t + Duration::milliseconds((minutes * MILLIS_PER_MIN).round() as i64)
}

/// Minutes after UTC midnight for `t`, fractional.
#[inline]
pub fn minute_of_day(t: DateTime<Utc>) -> f64 {
    use chrono::Timelike;
    f64::from(t.num_seconds_from_midnight()) / 60.0 + f64::from(t.nanosecond()) / 6.0e10
}

//! Clock abstraction and calendar-window arithmetic.
//!
//! Every tier of the admission core asks an injected [`Clock`] for "now"
//! instead of reading system time directly, so tests can drive window expiry,
//! UTC-midnight rollover and month rollover deterministically.

use chrono::{DateTime, Datelike, Days, Utc};
use std::sync::Arc;
use std::sync::Mutex;

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests to cross window,
/// day and month boundaries without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = *now + duration;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

/// Next UTC midnight strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .expect("date overflow");
    tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

/// Whole seconds from `now` until the next UTC midnight, at least 1.
pub fn seconds_until_midnight(now: DateTime<Utc>) -> u64 {
    let secs = (next_utc_midnight(now) - now).num_seconds();
    secs.max(1) as u64
}

/// Calendar-day bucket key, `YYYY-MM-DD` in UTC.
pub fn utc_date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// First instant of the month after the one containing `now`.
pub fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first of month is always valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

/// Whole seconds from `now` until the next month boundary, at least 1.
pub fn seconds_until_next_month(now: DateTime<Utc>) -> u64 {
    let secs = (next_month_start(now) - now).num_seconds();
    secs.max(1) as u64
}

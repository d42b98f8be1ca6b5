//! Clock used by time sources.
//!
//! Reads the wall clock or, when the installed [`RuntimeConfig`] selects
//! [`ClockSource::Manual`], a per-thread counter that only moves when told to.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ClockSource, RuntimeConfig};
use crate::Time;

thread_local! {
    static MANUAL_NOW: Cell<Time> = const { Cell::new(0.0) };
}

/// Current time in milliseconds.
pub fn now() -> Time {
    match RuntimeConfig::current().clock {
        ClockSource::System => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0),
        ClockSource::Manual => MANUAL_NOW.with(Cell::get),
    }
}

/// Move the manual clock forward by `ms` milliseconds.
///
/// Negative steps are ignored; time never runs backwards.
pub fn advance(ms: Time) {
    if ms > 0.0 {
        MANUAL_NOW.with(|now| now.set(now.get() + ms));
    }
}

/// Set the manual clock to an absolute reading.
pub fn set(ms: Time) {
    MANUAL_NOW.with(|now| now.set(ms));
}

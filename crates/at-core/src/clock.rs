//! Time source for presence observations.

use chrono::{Local, NaiveDateTime};

use crate::interval::truncate_to_second;

/// Supplies the local wall-clock time of an observation.
pub trait Clock {
    /// Current local time, truncated to whole seconds.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_second(Local::now().naive_local())
    }
}

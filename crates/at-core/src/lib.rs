//! Core domain logic for the attendance monitor.
//!
//! This crate contains the fundamental types and logic for:
//! - Intervals: day-bounded presence intervals and their text encoding
//! - Merging: folding a presence observation into the newest stored interval
//! - Directory: resolving gateway devices to whitelisted users
//! - Clock: the time source the monitor samples once per tick

pub mod clock;
pub mod directory;
pub mod interval;
pub mod merge;

pub use clock::{Clock, SystemClock};
pub use directory::{Device, DirectoryError, UserDirectory, UserEntry};
pub use interval::{
    AttendanceInterval, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp, split_by_day,
    truncate_to_second,
};
pub use merge::{DEFAULT_MERGE_THRESHOLD, MergePlan, Transition, plan_presence};

//! Folding a presence observation into a user's interval history.
//!
//! Only the single newest stored interval is ever consulted. Once an
//! observation arrives more than the merge threshold after it, that interval
//! is closed for good and a new one starts; older history is never reopened.

use std::fmt;

use chrono::{Duration, NaiveDateTime};

use crate::interval::{AttendanceInterval, split_by_day, truncate_to_second};

/// Maximum gap between an observation and the newest interval's end for the
/// interval to be extended.
pub const DEFAULT_MERGE_THRESHOLD: Duration = Duration::seconds(30 * 60);

/// How an observation changed a user's newest interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First sighting; a `[now, now]` interval is created.
    Started,
    /// The observation is not later than the newest interval's end.
    Unchanged,
    /// The newest interval now ends at the observation.
    Extended,
    /// The extended span crossed midnight and was stored as per-day pieces.
    ExtendedWithSplit { pieces: usize },
    /// The gap exceeded the threshold; the newest interval is left as is and
    /// a new `[now, now]` interval is created.
    ClosedThenStarted,
}

impl Transition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Unchanged => "unchanged",
            Self::Extended => "extended",
            Self::ExtendedWithSplit { .. } => "extended_with_split",
            Self::ClosedThenStarted => "closed_then_started",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage changes needed to record one observation.
///
/// Applying a plan means deleting `delete` (if any) and inserting every
/// `insert` span, all inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub delete: Option<i64>,
    pub insert: Vec<(NaiveDateTime, NaiveDateTime)>,
    pub transition: Transition,
}

impl MergePlan {
    /// True when applying the plan would not touch storage.
    pub fn is_noop(&self) -> bool {
        self.delete.is_none() && self.insert.is_empty()
    }
}

/// Decides how an observation at `now` folds into `latest`, the user's newest
/// stored interval.
///
/// `now` is truncated to whole seconds first, matching the stored precision.
pub fn plan_presence(
    latest: Option<&AttendanceInterval>,
    now: NaiveDateTime,
    threshold: Duration,
) -> MergePlan {
    let now = truncate_to_second(now);
    let Some(latest) = latest else {
        return MergePlan {
            delete: None,
            insert: vec![(now, now)],
            transition: Transition::Started,
        };
    };

    if now <= latest.end {
        return MergePlan {
            delete: None,
            insert: Vec::new(),
            transition: Transition::Unchanged,
        };
    }

    let gap = now.signed_duration_since(latest.end);
    if gap > threshold {
        return MergePlan {
            delete: None,
            insert: vec![(now, now)],
            transition: Transition::ClosedThenStarted,
        };
    }

    let pieces = split_by_day(latest.start, now);
    let transition = if pieces.len() > 1 {
        Transition::ExtendedWithSplit {
            pieces: pieces.len(),
        }
    } else {
        Transition::Extended
    };
    MergePlan {
        delete: Some(latest.id),
        insert: pieces,
        transition,
    }
}

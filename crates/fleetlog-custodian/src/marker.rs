//! Deletion deadline markers
//!
//! Each uploaded file carries a marker deciding when it may be removed.
//! The on-disk and in-memory numeric form is a single signed integer whose
//! sign selects the format, kept for compatibility with state written by
//! earlier agent versions:
//!
//! - `0` - delete on the next sweep
//! - positive - absolute wall-clock deadline (epoch seconds)
//! - negative - two's-complement of `mtime + keep_seconds`, an absolute
//!   deadline derived from file mtime and therefore stable when the system
//!   clock is corrected
//!
//! [`DeleteAfter`] is the decoded, explicit form used everywhere else.

use serde::{Deserialize, Serialize};

/// Seconds per day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// When an uploaded file becomes eligible for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteAfter {
    /// Eligible on the next sweep.
    Immediate,
    /// Eligible at an absolute wall-clock instant (legacy format).
    AbsoluteWall(i64),
    /// Eligible at `mtime + keep_seconds`, stored as the absolute target.
    MtimeAnchored(i64),
}

impl DeleteAfter {
    /// Builds the mtime-anchored marker for a file modified at
    /// `mtime_secs`, kept for `keep_days` days.
    pub fn anchored(mtime_secs: i64, keep_days: u32) -> Self {
        DeleteAfter::MtimeAnchored(mtime_secs + i64::from(keep_days) * SECONDS_PER_DAY)
    }

    /// Decodes the legacy numeric encoding.
    pub fn decode(raw: i64) -> Self {
        match raw {
            0 => DeleteAfter::Immediate,
            n if n > 0 => DeleteAfter::AbsoluteWall(n),
            n => DeleteAfter::MtimeAnchored(-n),
        }
    }

    /// Encodes into the legacy numeric form.
    pub fn encode(self) -> i64 {
        match self {
            DeleteAfter::Immediate => 0,
            DeleteAfter::AbsoluteWall(t) => t,
            DeleteAfter::MtimeAnchored(t) => -t,
        }
    }

    /// The absolute deadline, if any.
    pub fn deadline(self) -> Option<i64> {
        match self {
            DeleteAfter::Immediate => None,
            DeleteAfter::AbsoluteWall(t) | DeleteAfter::MtimeAnchored(t) => Some(t),
        }
    }

    /// True when the file may be deleted at wall-clock `now` (epoch secs).
    pub fn is_due(self, now: i64) -> bool {
        match self.deadline() {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }
}

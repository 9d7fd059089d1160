//! Wall-clock schedule arithmetic
//!
//! Upload schedules and operational hours are expressed as `HH:MM` strings in
//! the configuration. [`HhMm`] is the parsed form; comparisons are done in
//! minutes-since-midnight so that the "fire within one minute of the
//! schedule" test is a plain integer distance.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error parsing an `HH:MM` wall-clock string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid HH:MM time: {0}")]
pub struct TimeParseError(pub String);

/// A wall-clock time of day, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HhMm {
    hour: u8,
    minute: u8,
}

impl HhMm {
    /// Midnight, the start of the wall-clock day.
    pub const MIDNIGHT: HhMm = HhMm { hour: 0, minute: 0 };

    /// The last schedulable minute of the day.
    pub const LAST_MINUTE: HhMm = HhMm {
        hour: 23,
        minute: 59,
    };

    /// Creates a time of day from components, clamping out-of-range values.
    ///
    /// Intended for compile-time defaults; parsed input goes through
    /// [`HhMm::new`] so bad operator input is rejected, not clamped.
    pub const fn clamped(hour: u8, minute: u8) -> HhMm {
        HhMm {
            hour: if hour > 23 { 23 } else { hour },
            minute: if minute > 59 { 59 } else { minute },
        }
    }

    /// Creates a time of day; hours 0-23, minutes 0-59.
    pub fn new(hour: u8, minute: u8) -> Result<Self, TimeParseError> {
        if hour > 23 || minute > 59 {
            return Err(TimeParseError(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight.
    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    /// True when `now` falls within one minute of this time.
    ///
    /// Distance is computed in minutes-since-midnight, so 23:59 and 00:01
    /// are deliberately far apart; the scheduler ticks every minute and a
    /// schedule at midnight still gets two chances to fire.
    pub fn is_near(&self, now: NaiveTime) -> bool {
        let now_minutes = now.hour() * 60 + now.minute();
        let schedule_minutes = self.minutes_since_midnight();
        now_minutes.abs_diff(schedule_minutes) <= 1
    }

    /// True when `now` lies in the inclusive window `start..=end`.
    pub fn contains(start: HhMm, end: HhMm, now: NaiveTime) -> bool {
        let now_minutes = now.hour() * 60 + now.minute();
        start.minutes_since_midnight() <= now_minutes
            && now_minutes <= end.minutes_since_midnight()
    }
}

impl fmt::Display for HhMm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for HhMm {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| TimeParseError(s.to_string()))?;
        let hour: u8 = h.parse().map_err(|_| TimeParseError(s.to_string()))?;
        let minute: u8 = m.parse().map_err(|_| TimeParseError(s.to_string()))?;
        Self::new(hour, minute).map_err(|_| TimeParseError(s.to_string()))
    }
}

impl Serialize for HhMm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HhMm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::Deref,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Microseconds since the `UNIX_EPOCH`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixMicro(u64);

impl UnixMicro {
    #[must_use]
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    /// Current time as `UnixMicro`.
    #[must_use]
    pub fn now() -> Self {
        UnixMicro(
            u64::try_from(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .expect("broken system clock")
                    .as_micros(),
            )
            .expect("really broken system clock"),
        )
    }
}

impl Deref for UnixMicro {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A clock time without a date, stored as seconds since midnight.
///
/// Parsed from `HH:MM` or `HH:MM:SS` in 24-hour notation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseTimeOfDayError {
    #[error("expected HH:MM or HH:MM:SS: '{0}'")]
    Format(String),

    #[error("not a number: '{0}'")]
    NotANumber(String),

    #[error("hour out of range: {0}")]
    Hour(u32),

    #[error("minute out of range: {0}")]
    Minute(u32),

    #[error("second out of range: {0}")]
    Second(u32),
}

impl TimeOfDay {
    #[must_use]
    pub fn as_secs(self) -> u32 {
        self.0
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ParseTimeOfDayError::*;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(Format(s.to_owned()));
        }

        let mut nums = [0; 3];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(Format(s.to_owned()));
            }
            nums[i] = part.parse().map_err(|_| NotANumber((*part).to_owned()))?;
        }

        let [hour, minute, second] = nums;
        if hour > 23 {
            return Err(Hour(hour));
        }
        if minute > 59 {
            return Err(Minute(minute));
        }
        if second > 59 {
            return Err(Second(second));
        }
        Ok(Self(hour * 3600 + minute * 60 + second))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hour, minute, second) = (self.0 / 3600, (self.0 / 60) % 60, self.0 % 60);
        if second == 0 {
            write!(f, "{hour:02}:{minute:02}")
        } else {
            write!(f, "{hour:02}:{minute:02}:{second:02}")
        }
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A wall-clock instant reduced to seconds since local midnight.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DaySecond(u32);

impl DaySecond {
    /// Values outside a day wrap around midnight.
    #[must_use]
    pub fn new(v: u32) -> Self {
        Self(v % SECONDS_PER_DAY)
    }

    /// Seconds since midnight in the system time zone.
    #[must_use]
    pub fn now() -> Self {
        let now = jiff::Zoned::now();
        Self(
            u32::from(now.hour().unsigned_abs()) * 3600
                + u32::from(now.minute().unsigned_abs()) * 60
                + u32::from(now.second().unsigned_abs()),
        )
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<TimeOfDay> for DaySecond {
    fn from(v: TimeOfDay) -> Self {
        Self(v.as_secs())
    }
}

/// Optional daily activation window.
///
/// A window only restricts when both ends are present. `end <= start`
/// wraps past midnight, which makes the degenerate `start == end` window
/// active the full 24 hours.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeWindowRepr", into = "TimeWindowRepr")]
pub struct TimeWindow {
    pub start: Option<TimeOfDay>,
    pub end: Option<TimeOfDay>,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: Option<TimeOfDay>, end: Option<TimeOfDay>) -> Self {
        Self { start, end }
    }

    /// Whether the window restricts activation at all.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Reports whether the window is active at `now`.
    ///
    /// Both bounds are inclusive. Pure, no side effects.
    #[must_use]
    pub fn is_active(&self, now: DaySecond) -> bool {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return true;
        };
        let (start, end, now) = (start.as_secs(), end.as_secs(), now.get());
        if end > start {
            start <= now && now <= end
        } else {
            // Crosses midnight.
            now >= start || now <= end
        }
    }

    /// Seconds of the day covered by the window. An unrestricted or
    /// degenerate window covers the whole day. Used to rank windows by
    /// specificity.
    #[must_use]
    pub fn width_secs(&self) -> u32 {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return SECONDS_PER_DAY;
        };
        let (start, end) = (start.as_secs(), end.as_secs());
        if end > start {
            end - start
        } else if start > end {
            SECONDS_PER_DAY - (start - end)
        } else {
            SECONDS_PER_DAY
        }
    }
}

/// Wire format with the empty string as the absent sentinel.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct TimeWindowRepr {
    #[serde(default)]
    start_time: String,

    #[serde(default)]
    end_time: String,
}

impl TryFrom<TimeWindowRepr> for TimeWindow {
    type Error = ParseTimeOfDayError;

    fn try_from(repr: TimeWindowRepr) -> Result<Self, Self::Error> {
        let parse = |s: &str| -> Result<Option<TimeOfDay>, ParseTimeOfDayError> {
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.parse()?))
            }
        };
        Ok(Self {
            start: parse(&repr.start_time)?,
            end: parse(&repr.end_time)?,
        })
    }
}

impl From<TimeWindow> for TimeWindowRepr {
    fn from(window: TimeWindow) -> Self {
        let render = |t: Option<TimeOfDay>| t.map(|t| t.to_string()).unwrap_or_default();
        Self {
            start_time: render(window.start),
            end_time: render(window.end),
        }
    }
}

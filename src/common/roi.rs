// SPDX-License-Identifier: GPL-2.0-or-later

use crate::{
    geometry::Polygon,
    time::{TimeWindow, UnixMicro},
    CameraId, RoiId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PRIORITY_MIN: i64 = 1;
pub const PRIORITY_MAX: i64 = 5;

/// Rank of a zone when overlapping zones compete, 1 (low) to 5 (critical).
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePriorityError {
    #[error("priority {0} outside valid range [{PRIORITY_MIN},{PRIORITY_MAX}]")]
    OutOfRange(i64),
}

impl TryFrom<i64> for Priority {
    type Error = ParsePriorityError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&v) {
            return Err(ParsePriorityError::OutOfRange(v));
        }
        Ok(Self(u8::try_from(v).expect("range checked")))
    }
}

impl From<Priority> for i64 {
    fn from(v: Priority) -> Self {
        Self::from(v.0)
    }
}

impl Priority {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A validated zone record. Only the store constructs these, so a record
/// inside the store always upholds the polygon, priority and time window
/// invariants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub id: RoiId,
    pub camera_id: CameraId,

    #[serde(default)]
    pub name: String,

    pub polygon: Polygon,
    pub enabled: bool,
    pub priority: Priority,

    #[serde(flatten)]
    pub window: TimeWindow,

    pub created_at: UnixMicro,
    pub updated_at: UnixMicro,
}

/// Unvalidated client payload for create/update/bulk requests.
///
/// Fields are raw so that an out-of-range priority or a malformed time
/// string surfaces as a store validation error rather than a
/// deserialization failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiData {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub camera_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub polygon: Vec<crate::geometry::Point>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub priority: i64,

    #[serde(default)]
    pub start_time: String,

    #[serde(default)]
    pub end_time: String,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(5)]
    fn test_priority_valid(v: i64) {
        assert_eq!(v, i64::from(Priority::try_from(v).unwrap()));
    }

    #[test_case(0)]
    #[test_case(-1)]
    #[test_case(6)]
    #[test_case(10)]
    fn test_priority_invalid(v: i64) {
        assert_eq!(
            ParsePriorityError::OutOfRange(v),
            Priority::try_from(v).unwrap_err()
        );
    }

    #[test]
    fn test_roi_data_defaults() {
        let data: RoiData = serde_json::from_str(r#"{"priority":2}"#).unwrap();
        assert!(data.enabled);
        assert!(data.id.is_empty());
        assert!(data.start_time.is_empty());
    }
}

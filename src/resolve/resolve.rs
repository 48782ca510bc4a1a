// SPDX-License-Identifier: GPL-2.0-or-later

use common::{
    geometry::{contains_point, Point},
    roi::{Priority, Roi},
    time::DaySecond,
    RoiId,
};
use serde::Serialize;
use std::cmp::Ordering;

/// The zone that won a detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Winner {
    pub roi_id: RoiId,
    pub priority: Priority,
}

/// Outcome of resolving one detection point against a set of zones.
///
/// `candidates` lists every zone that matched, winner first, so a
/// client can see what the winner was picked from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub winner: Option<Winner>,
    pub candidates: Vec<RoiId>,
}

/// Picks the zone that claims a detection at `point`.
///
/// A zone is a candidate when it is enabled, geometrically contains the
/// point, and its time window is active at `at`. Candidates are ranked
/// by descending priority; ties go to the zone with the narrower daily
/// window, and then to the lexicographically smaller id so the outcome
/// is deterministic.
#[must_use]
pub fn resolve(rois: &[Roi], point: Point, at: DaySecond) -> Resolution {
    let mut candidates: Vec<&Roi> = rois
        .iter()
        .filter(|roi| {
            roi.enabled && roi.window.is_active(at) && contains_point(&roi.polygon, point)
        })
        .collect();

    candidates.sort_unstable_by(|a, b| rank(a, b));

    Resolution {
        winner: candidates.first().map(|roi| Winner {
            roi_id: roi.id.clone(),
            priority: roi.priority,
        }),
        candidates: candidates.iter().map(|roi| roi.id.clone()).collect(),
    }
}

fn rank(a: &Roi, b: &Roi) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.window.width_secs().cmp(&b.window.width_secs()))
        .then_with(|| a.id.cmp(&b.id))
}

//! Point deltas for visit and scan events.

use serde::{Deserialize, Serialize};

use crate::records::{Location, ScoringMode};

/// What the participant just did at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The view moved to the location for the first time.
    Visit,
    /// Presence was confirmed by a code at the active location.
    Scan,
}

/// Points earned for `kind` at `location` under `mode`.
///
/// Callers decide whether the event counts at all (first visit, scannable
/// trigger); this only maps the event onto a delta.
#[must_use]
pub const fn score(mode: ScoringMode, kind: EventKind, location: &Location) -> u32 {
    match (mode, kind) {
        (ScoringMode::LocationsEntered, EventKind::Visit)
        | (ScoringMode::ScannedCodes, EventKind::Scan) => 1,
        (ScoringMode::PointsBased, EventKind::Visit) => location.score_points,
        (ScoringMode::NotScored, _)
        | (ScoringMode::LocationsEntered | ScoringMode::PointsBased, EventKind::Scan)
        | (ScoringMode::ScannedCodes, EventKind::Visit) => 0,
    }
}

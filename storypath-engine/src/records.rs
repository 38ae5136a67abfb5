//! Project and location records as served by the data store.
//!
//! Records are read-only for the lifetime of a session. Enumerated fields
//! decode from the labels the authoring tool stores and never fail: an
//! unrecognised label falls back to the documented default.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn parse_raw_id<E: serde::de::Error>(raw: RawId) -> Result<u64, E> {
    match raw {
        RawId::Number(value) => Ok(value),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("invalid identifier `{text}`"))),
    }
}

/// A stored label, or any other value a loosely typed row might hold.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Text(String),
    Other(IgnoredAny),
}

fn label_or_default<'de, D, T>(deserializer: D, from_label: fn(&str) -> T) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default,
{
    Ok(match Option::<RawLabel>::deserialize(deserializer)? {
        Some(RawLabel::Text(label)) => from_label(&label),
        Some(RawLabel::Other(_)) | None => T::default(),
    })
}

macro_rules! lenient_label {
    ($name:ident) => {
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                label_or_default(deserializer, Self::from_label)
            }
        }
    };
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer)
                    .and_then(parse_raw_id::<D::Error>)
                    .map(Self)
            }
        }
    };
}

record_id!(
    /// Project identifier. Accepts JSON numbers and numeric strings.
    ProjectId
);
record_id!(
    /// Location identifier. Ascending order is creation order.
    LocationId
);

/// How a participant earns points while walking a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "&'static str")]
pub enum ScoringMode {
    NotScored,
    ScannedCodes,
    LocationsEntered,
    #[default]
    PointsBased,
}

impl ScoringMode {
    /// Label written by the authoring tool.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotScored => "Not Scored",
            Self::ScannedCodes => "Number of Scanned QR Codes",
            Self::LocationsEntered => "Number of Locations Entered",
            Self::PointsBased => "Score",
        }
    }

    /// Map a stored label onto a mode, falling back to `PointsBased`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Not Scored" | "NotScored" => Self::NotScored,
            "Number of Scanned QR Codes" | "ScannedCodes" => Self::ScannedCodes,
            "Number of Locations Entered" | "LocationsEntered" => Self::LocationsEntered,
            _ => Self::PointsBased,
        }
    }
}

lenient_label!(ScoringMode);

impl From<ScoringMode> for &'static str {
    fn from(value: ScoringMode) -> Self {
        value.label()
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the homescreen shows before any location is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "&'static str")]
pub enum HomescreenDisplay {
    #[default]
    InitialClue,
    AllLocations,
}

impl HomescreenDisplay {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InitialClue => "Display initial clue",
            Self::AllLocations => "Display all locations",
        }
    }

    /// Map a stored label onto a display mode, falling back to `InitialClue`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Display all locations" | "AllLocations" => Self::AllLocations,
            _ => Self::InitialClue,
        }
    }
}

lenient_label!(HomescreenDisplay);

impl From<HomescreenDisplay> for &'static str {
    fn from(value: HomescreenDisplay) -> Self {
        value.label()
    }
}

/// How a location counts as reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "&'static str")]
pub enum LocationTrigger {
    /// Reaching the location is enough.
    #[default]
    Entry,
    /// Presence is confirmed by scanning the location's code.
    Code,
    /// Either entry or a code scan.
    Both,
}

impl LocationTrigger {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Entry => "Location",
            Self::Code => "QR Code",
            Self::Both => "Both",
        }
    }

    /// Map a stored label onto a trigger, falling back to `Entry`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "QR Code" | "Code" => Self::Code,
            "Both" => Self::Both,
            _ => Self::Entry,
        }
    }

    /// Whether a code scan can confirm presence here.
    #[must_use]
    pub const fn accepts_code(self) -> bool {
        matches!(self, Self::Code | Self::Both)
    }
}

lenient_label!(LocationTrigger);

impl From<LocationTrigger> for &'static str {
    fn from(value: LocationTrigger) -> Self {
        value.label()
    }
}

impl fmt::Display for LocationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Geocoordinate pair stored as `"lat,lng"`. The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub struct Position(String);

impl Position {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the stored pair for hosts that place a marker on a map.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lng) = self.0.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
    }
}

impl From<Option<String>> for Position {
    fn from(value: Option<String>) -> Self {
        Self(value.unwrap_or_default())
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.0
    }
}

fn nullable_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn nullable_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn nullable_points<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// An authored experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(default, deserialize_with = "nullable_text")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_text")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_text")]
    pub instructions: String,
    #[serde(default, deserialize_with = "nullable_text")]
    pub initial_clue: String,
    #[serde(default, deserialize_with = "nullable_bool")]
    pub is_published: bool,
    #[serde(default)]
    pub participant_scoring: ScoringMode,
    #[serde(default)]
    pub homescreen_display: HomescreenDisplay,
}

impl Project {
    /// Minimal project with default scoring and homescreen display.
    #[must_use]
    pub fn new(id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            instructions: String::new(),
            initial_clue: String::new(),
            is_published: false,
            participant_scoring: ScoringMode::default(),
            homescreen_display: HomescreenDisplay::default(),
        }
    }
}

/// A stop within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub project_id: ProjectId,
    #[serde(default, deserialize_with = "nullable_text")]
    pub location_name: String,
    #[serde(default, deserialize_with = "nullable_text")]
    pub clue: String,
    /// Author markup, handed to the host verbatim.
    #[serde(
        rename = "location_content",
        alias = "content",
        default,
        deserialize_with = "nullable_text"
    )]
    pub content: String,
    #[serde(default)]
    pub location_trigger: LocationTrigger,
    #[serde(rename = "location_position", alias = "position", default)]
    pub position: Position,
    #[serde(default, deserialize_with = "nullable_points")]
    pub score_points: u32,
}

impl Location {
    /// Minimal entry-triggered location worth `score_points`.
    #[must_use]
    pub fn new(
        id: LocationId,
        project_id: ProjectId,
        name: impl Into<String>,
        score_points: u32,
    ) -> Self {
        Self {
            id,
            project_id,
            location_name: name.into(),
            clue: String::new(),
            content: String::new(),
            location_trigger: LocationTrigger::Entry,
            position: Position::default(),
            score_points,
        }
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: LocationTrigger) -> Self {
        self.location_trigger = trigger;
        self
    }

    #[must_use]
    pub fn with_clue(mut self, clue: impl Into<String>) -> Self {
        self.clue = clue.into();
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// The clue, if the author wrote one.
    #[must_use]
    pub fn clue_text(&self) -> Option<&str> {
        let clue = self.clue.trim();
        (!clue.is_empty()).then_some(clue)
    }
}

/// Put locations into canonical creation order.
pub fn sort_locations(locations: &mut [Location]) {
    locations.sort_by_key(|location| location.id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_labels_fall_back_to_points_based() {
        assert_eq!(
            ScoringMode::from_label("Number of Locations Entered"),
            ScoringMode::LocationsEntered
        );
        assert_eq!(
            ScoringMode::from_label("Number of Scanned QR Codes"),
            ScoringMode::ScannedCodes
        );
        assert_eq!(ScoringMode::from_label("Not Scored"), ScoringMode::NotScored);
        assert_eq!(ScoringMode::from_label("Score"), ScoringMode::PointsBased);
        assert_eq!(ScoringMode::from_label("whatever"), ScoringMode::PointsBased);
    }

    #[test]
    fn homescreen_and_trigger_labels_fall_back() {
        assert_eq!(
            HomescreenDisplay::from_label("Display all locations"),
            HomescreenDisplay::AllLocations
        );
        assert_eq!(
            HomescreenDisplay::from_label("Display a map"),
            HomescreenDisplay::InitialClue
        );
        assert_eq!(LocationTrigger::from_label("QR Code"), LocationTrigger::Code);
        assert_eq!(LocationTrigger::from_label("Both"), LocationTrigger::Both);
        assert_eq!(LocationTrigger::from_label("Location"), LocationTrigger::Entry);
        assert_eq!(LocationTrigger::from_label("teleport"), LocationTrigger::Entry);
        assert!(LocationTrigger::Both.accepts_code());
        assert!(!LocationTrigger::Entry.accepts_code());
    }

    #[test]
    fn project_row_decodes_with_nulls_and_unknown_labels() {
        let json = r#"{
            "id": 7,
            "title": "Campus Hunt",
            "description": null,
            "instructions": "Follow the clues",
            "initial_clue": "Start at the library",
            "participant_scoring": "Bonus Round",
            "homescreen_display": null,
            "is_published": null,
            "username": "author1"
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.id, ProjectId(7));
        assert_eq!(project.description, "");
        assert!(!project.is_published);
        assert_eq!(project.participant_scoring, ScoringMode::PointsBased);
        assert_eq!(project.homescreen_display, HomescreenDisplay::InitialClue);
    }

    #[test]
    fn non_text_labels_fall_back_to_defaults() {
        let project: Project = serde_json::from_str(
            r#"{"id": 1, "participant_scoring": 3, "homescreen_display": {"kind": "map"}, "is_published": null}"#,
        )
        .unwrap();
        assert_eq!(project.participant_scoring, ScoringMode::PointsBased);
        assert_eq!(project.homescreen_display, HomescreenDisplay::InitialClue);
        assert!(!project.is_published);

        let location: Location = serde_json::from_str(
            r#"{"id": 2, "project_id": 1, "location_trigger": true}"#,
        )
        .unwrap();
        assert_eq!(location.location_trigger, LocationTrigger::Entry);

        let mode: ScoringMode = serde_json::from_str("null").unwrap();
        assert_eq!(mode, ScoringMode::PointsBased);
        let mode: ScoringMode = serde_json::from_str(r#""Not Scored""#).unwrap();
        assert_eq!(mode, ScoringMode::NotScored);
    }

    #[test]
    fn location_row_accepts_string_ids_and_wire_names() {
        let json = r#"{
            "id": "12",
            "project_id": "7",
            "location_name": "Great Court",
            "location_content": "<p>Look up</p>",
            "location_position": "-27.4975, 153.0137",
            "location_trigger": "QR Code",
            "score_points": null,
            "clue": "  "
        }"#;
        let location: Location = serde_json::from_str(json).unwrap();
        assert_eq!(location.id, LocationId(12));
        assert_eq!(location.project_id, ProjectId(7));
        assert_eq!(location.content, "<p>Look up</p>");
        assert_eq!(location.location_trigger, LocationTrigger::Code);
        assert_eq!(location.score_points, 0);
        assert_eq!(location.clue_text(), None);
        assert_eq!(location.position.coordinates(), Some((-27.4975, 153.0137)));
    }

    #[test]
    fn labels_serialize_back_to_wire_form() {
        let mut project = Project::new(ProjectId(1), "Tour");
        project.participant_scoring = ScoringMode::ScannedCodes;
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["participant_scoring"], "Number of Scanned QR Codes");
        assert_eq!(value["homescreen_display"], "Display initial clue");

        let location = Location::new(LocationId(3), ProjectId(1), "Gate", 4)
            .with_trigger(LocationTrigger::Both);
        let value = serde_json::to_value(&location).unwrap();
        assert_eq!(value["location_trigger"], "Both");
        assert_eq!(value["location_position"], "");
    }

    #[test]
    fn negative_points_are_rejected() {
        let json = r#"{"id": 1, "project_id": 1, "score_points": -3}"#;
        assert!(serde_json::from_str::<Location>(json).is_err());
    }

    #[test]
    fn sort_orders_by_creation_id() {
        let mut locations = vec![
            Location::new(LocationId(9), ProjectId(1), "c", 0),
            Location::new(LocationId(2), ProjectId(1), "a", 0),
            Location::new(LocationId(5), ProjectId(1), "b", 0),
        ];
        sort_locations(&mut locations);
        let names: Vec<_> = locations.iter().map(|l| l.location_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn malformed_position_has_no_coordinates() {
        assert_eq!(Position::new("near the tree").coordinates(), None);
        assert_eq!(Position::new("1.5,abc").coordinates(), None);
        assert_eq!(Position::default().coordinates(), None);
    }
}

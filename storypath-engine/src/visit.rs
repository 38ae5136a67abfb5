//! Visit state machine for a single simulated run of a project.
//!
//! The session is a plain value; [`VisitSession::apply`] is the pure
//! transition function and [`VisitMachine`] holds the only mutable handle.

use std::collections::BTreeSet;

use log::{debug, warn};
use serde::Serialize;

use crate::code::NavigationIntent;
use crate::records::{HomescreenDisplay, Location, LocationId, Project, sort_locations};
use crate::scoring::{EventKind, score};

/// A loaded project together with its locations in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experience {
    project: Project,
    locations: Vec<Location>,
}

impl Experience {
    /// Build an experience, sorting locations ascending by id.
    #[must_use]
    pub fn new(project: Project, mut locations: Vec<Location>) -> Self {
        sort_locations(&mut locations);
        Self { project, locations }
    }

    #[must_use]
    pub const fn project(&self) -> &Project {
        &self.project
    }

    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    #[must_use]
    pub fn location(&self, index: usize) -> Option<&Location> {
        self.locations.get(index)
    }

    #[must_use]
    pub fn index_of(&self, id: LocationId) -> Option<usize> {
        self.locations.iter().position(|location| location.id == id)
    }

    /// Sum of every location's authored points.
    #[must_use]
    pub fn max_points(&self) -> u32 {
        self.locations
            .iter()
            .fold(0u32, |total, location| total.saturating_add(location.score_points))
    }
}

/// The view the participant is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "view", content = "index", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Homescreen,
    Location(usize),
}

impl Selection {
    /// Map a list index onto a selection, where `-1` is the homescreen.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError::NegativeIndex`] for any other negative index.
    /// An index too large for `usize` saturates and is later rejected as
    /// [`VisitError::IndexOutOfRange`].
    pub fn from_index(index: i64) -> Result<Self, VisitError> {
        match index {
            -1 => Ok(Self::Homescreen),
            i if i < 0 => Err(VisitError::NegativeIndex(i)),
            i => Ok(Self::Location(usize::try_from(i).unwrap_or(usize::MAX))),
        }
    }

    /// The list index, with `-1` for the homescreen.
    #[must_use]
    pub fn as_index(self) -> i64 {
        match self {
            Self::Homescreen => -1,
            Self::Location(index) => i64::try_from(index).unwrap_or(i64::MAX),
        }
    }

    fn active_location(self, experience: &Experience) -> Option<(usize, &Location)> {
        match self {
            Self::Homescreen => None,
            Self::Location(index) => experience.location(index).map(|location| (index, location)),
        }
    }
}

/// Events the host forwards into a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitEvent {
    SelectLocation(Selection),
    ScanAtCurrent,
}

/// Why a scan left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanIgnored {
    AtHomescreen,
    EntryOnly,
}

/// Result of a single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VisitOutcome {
    /// Re-selection of the active view.
    Unchanged,
    Moved {
        to: Selection,
        first_visit: bool,
        delta: u32,
    },
    Scanned {
        delta: u32,
    },
    ScanIgnored {
        reason: ScanIgnored,
    },
}

impl VisitOutcome {
    /// Points this transition added.
    #[must_use]
    pub const fn delta(self) -> u32 {
        match self {
            Self::Moved { delta, .. } | Self::Scanned { delta } => delta,
            Self::Unchanged | Self::ScanIgnored { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VisitError {
    #[error("location index {index} is outside the {len} loaded locations")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("negative location index {0}; only -1 selects the homescreen")]
    NegativeIndex(i64),
}

/// Per-run participant state. Never persisted or shared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VisitSession {
    current: Selection,
    visited: BTreeSet<LocationId>,
    points: u32,
}

impl VisitSession {
    /// Fresh session at the homescreen.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn current(&self) -> Selection {
        self.current
    }

    #[must_use]
    pub const fn visited(&self) -> &BTreeSet<LocationId> {
        &self.visited
    }

    #[must_use]
    pub const fn points(&self) -> u32 {
        self.points
    }

    /// Compute the successor state for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError::IndexOutOfRange`] when a selection or the active
    /// view does not address a loaded location. The session is unchanged.
    pub fn apply(
        &self,
        experience: &Experience,
        event: VisitEvent,
    ) -> Result<(Self, VisitOutcome), VisitError> {
        match event {
            VisitEvent::SelectLocation(selection) => self.select(experience, selection),
            VisitEvent::ScanAtCurrent => self.scan(experience),
        }
    }

    fn select(
        &self,
        experience: &Experience,
        selection: Selection,
    ) -> Result<(Self, VisitOutcome), VisitError> {
        let target = match selection {
            Selection::Homescreen => None,
            Selection::Location(index) => Some(locate(experience, index)?),
        };
        if selection == self.current {
            return Ok((self.clone(), VisitOutcome::Unchanged));
        }

        let mut next = self.clone();
        next.current = selection;
        let Some(location) = target else {
            return Ok((
                next,
                VisitOutcome::Moved {
                    to: selection,
                    first_visit: false,
                    delta: 0,
                },
            ));
        };

        let first_visit = next.visited.insert(location.id);
        let delta = if first_visit {
            score(
                experience.project.participant_scoring,
                EventKind::Visit,
                location,
            )
        } else {
            0
        };
        next.points = next.points.saturating_add(delta);
        Ok((
            next,
            VisitOutcome::Moved {
                to: selection,
                first_visit,
                delta,
            },
        ))
    }

    fn scan(&self, experience: &Experience) -> Result<(Self, VisitOutcome), VisitError> {
        let Selection::Location(index) = self.current else {
            return Ok((
                self.clone(),
                VisitOutcome::ScanIgnored {
                    reason: ScanIgnored::AtHomescreen,
                },
            ));
        };
        let location = locate(experience, index)?;
        if !location.location_trigger.accepts_code() {
            return Ok((
                self.clone(),
                VisitOutcome::ScanIgnored {
                    reason: ScanIgnored::EntryOnly,
                },
            ));
        }

        // Every scan counts again, including repeats at the same location.
        let delta = score(
            experience.project.participant_scoring,
            EventKind::Scan,
            location,
        );
        let mut next = self.clone();
        next.points = next.points.saturating_add(delta);
        Ok((next, VisitOutcome::Scanned { delta }))
    }
}

fn locate(experience: &Experience, index: usize) -> Result<&Location, VisitError> {
    experience
        .location(index)
        .ok_or(VisitError::IndexOutOfRange {
            index,
            len: experience.locations.len(),
        })
}

/// One entry in the "all locations" homescreen list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationEntry<'a> {
    /// Index to pass back as a selection.
    pub index: usize,
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "display", rename_all = "snake_case")]
pub enum HomescreenBody<'a> {
    InitialClue { clue: &'a str },
    AllLocations { entries: Vec<LocationEntry<'a>> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomescreenView<'a> {
    pub title: &'a str,
    pub instructions: &'a str,
    pub body: HomescreenBody<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationView<'a> {
    pub index: usize,
    pub name: &'a str,
    /// Author markup; the host is responsible for rendering it safely.
    pub content: &'a str,
    pub clue: Option<&'a str>,
    /// Whether the host should offer a code scan here.
    pub scan_available: bool,
}

/// What the host should present for the active view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen<'a> {
    Homescreen(HomescreenView<'a>),
    Location(LocationView<'a>),
}

/// Running totals shown beside the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisitStats {
    pub points: u32,
    pub max_points: u32,
    pub visited: usize,
    pub total_locations: usize,
}

/// Owns an experience and the session walking it.
#[derive(Debug, Clone)]
pub struct VisitMachine {
    experience: Experience,
    session: VisitSession,
}

impl VisitMachine {
    /// Start a session at the homescreen.
    #[must_use]
    pub fn new(experience: Experience) -> Self {
        Self {
            experience,
            session: VisitSession::new(),
        }
    }

    /// Convenience for hosts holding raw records.
    #[must_use]
    pub fn load(project: Project, locations: Vec<Location>) -> Self {
        Self::new(Experience::new(project, locations))
    }

    #[must_use]
    pub const fn experience(&self) -> &Experience {
        &self.experience
    }

    #[must_use]
    pub const fn session(&self) -> &VisitSession {
        &self.session
    }

    #[must_use]
    pub const fn project(&self) -> &Project {
        &self.experience.project
    }

    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.experience.locations
    }

    #[must_use]
    pub fn index_of(&self, id: LocationId) -> Option<usize> {
        self.experience.index_of(id)
    }

    /// Apply an event and keep the successor state.
    ///
    /// # Errors
    ///
    /// Propagates [`VisitError`] from the transition; the session is left as it was.
    pub fn dispatch(&mut self, event: VisitEvent) -> Result<VisitOutcome, VisitError> {
        let (next, outcome) = self.session.apply(&self.experience, event)?;
        debug!(
            "project {} {event:?} -> {outcome:?} (points {})",
            self.experience.project.id,
            next.points()
        );
        self.session = next;
        Ok(outcome)
    }

    /// Move to `selection`, scoring a first visit.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError::IndexOutOfRange`] for an unknown location index.
    pub fn select_location(&mut self, selection: Selection) -> Result<VisitOutcome, VisitError> {
        self.dispatch(VisitEvent::SelectLocation(selection))
    }

    /// Select by list index, where `-1` is the homescreen.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError`] for negative indices other than `-1` or indices
    /// past the end of the location list.
    pub fn select_index(&mut self, index: i64) -> Result<VisitOutcome, VisitError> {
        self.select_location(Selection::from_index(index)?)
    }

    /// Simulate a code scan at the active location.
    ///
    /// # Errors
    ///
    /// Only fails if the active view no longer addresses a loaded location,
    /// which cannot happen for sessions driven through this machine.
    pub fn scan_at_current(&mut self) -> Result<VisitOutcome, VisitError> {
        self.dispatch(VisitEvent::ScanAtCurrent)
    }

    /// Pre-select the location a resolved code points at.
    ///
    /// Returns `None` and stays at the homescreen when the intent belongs to
    /// another project or its location is not part of the loaded sequence.
    #[must_use = "None means the session stayed at the homescreen"]
    pub fn enter_from_intent(&mut self, intent: &NavigationIntent) -> Option<VisitOutcome> {
        if intent.project_id != self.experience.project.id {
            warn!(
                "navigation intent for project {} ignored by session for project {}",
                intent.project_id, self.experience.project.id
            );
            return None;
        }
        let Some(index) = self.index_of(intent.initial_location.id) else {
            warn!(
                "scanned location {} is not part of project {}",
                intent.initial_location.id, intent.project_id
            );
            return None;
        };
        match self.select_location(Selection::Location(index)) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!("could not pre-select scanned location: {err}");
                None
            }
        }
    }

    /// Content for the active view. Does not change the session.
    #[must_use]
    pub fn screen(&self) -> Screen<'_> {
        let project = &self.experience.project;
        match self.session.current.active_location(&self.experience) {
            Some((index, location)) => Screen::Location(LocationView {
                index,
                name: &location.location_name,
                content: &location.content,
                clue: location.clue_text(),
                scan_available: location.location_trigger.accepts_code(),
            }),
            None => {
                let body = match project.homescreen_display {
                    HomescreenDisplay::InitialClue => HomescreenBody::InitialClue {
                        clue: &project.initial_clue,
                    },
                    HomescreenDisplay::AllLocations => HomescreenBody::AllLocations {
                        entries: self
                            .experience
                            .locations
                            .iter()
                            .enumerate()
                            .map(|(index, location)| LocationEntry {
                                index,
                                name: &location.location_name,
                            })
                            .collect(),
                    },
                };
                Screen::Homescreen(HomescreenView {
                    title: &project.title,
                    instructions: &project.instructions,
                    body,
                })
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> VisitStats {
        VisitStats {
            points: self.session.points,
            max_points: self.experience.max_points(),
            visited: self.session.visited.len(),
            total_locations: self.experience.locations.len(),
        }
    }

    /// Consume the machine, returning the final session.
    #[must_use]
    pub fn into_session(self) -> VisitSession {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LocationTrigger, ProjectId, ScoringMode};

    fn experience(mode: ScoringMode) -> Experience {
        let mut project = Project::new(ProjectId(1), "Campus");
        project.participant_scoring = mode;
        project.initial_clue = "Begin where the books are".into();
        Experience::new(
            project,
            vec![
                Location::new(LocationId(20), ProjectId(1), "B", 3)
                    .with_trigger(LocationTrigger::Code),
                Location::new(LocationId(10), ProjectId(1), "A", 5),
            ],
        )
    }

    #[test]
    fn experience_sorts_and_totals() {
        let exp = experience(ScoringMode::PointsBased);
        assert_eq!(exp.locations()[0].location_name, "A");
        assert_eq!(exp.index_of(LocationId(20)), Some(1));
        assert_eq!(exp.max_points(), 8);
    }

    #[test]
    fn selection_index_mapping() {
        assert_eq!(Selection::from_index(-1), Ok(Selection::Homescreen));
        assert_eq!(Selection::from_index(2), Ok(Selection::Location(2)));
        assert_eq!(
            Selection::from_index(-4),
            Err(VisitError::NegativeIndex(-4))
        );
        assert_eq!(Selection::Location(3).as_index(), 3);
        assert_eq!(Selection::Homescreen.as_index(), -1);
    }

    #[test]
    fn pure_transition_leaves_input_untouched() {
        let exp = experience(ScoringMode::PointsBased);
        let start = VisitSession::new();
        let (next, outcome) = start
            .apply(&exp, VisitEvent::SelectLocation(Selection::Location(0)))
            .unwrap();
        assert_eq!(start, VisitSession::new());
        assert_eq!(next.points(), 5);
        assert_eq!(
            outcome,
            VisitOutcome::Moved {
                to: Selection::Location(0),
                first_visit: true,
                delta: 5
            }
        );
    }

    #[test]
    fn out_of_range_selection_is_rejected_without_change() {
        let mut machine = VisitMachine::new(experience(ScoringMode::PointsBased));
        let err = machine.select_location(Selection::Location(2)).unwrap_err();
        assert_eq!(err, VisitError::IndexOutOfRange { index: 2, len: 2 });
        assert_eq!(machine.session(), &VisitSession::new());
        assert!(machine.select_index(-2).is_err());

        let err = machine.select_index(i64::MAX).unwrap_err();
        assert!(matches!(err, VisitError::IndexOutOfRange { len: 2, .. }));
        assert_eq!(machine.session(), &VisitSession::new());
    }

    #[test]
    fn homescreen_reselection_is_unchanged() {
        let mut machine = VisitMachine::new(experience(ScoringMode::PointsBased));
        assert_eq!(
            machine.select_index(-1).unwrap(),
            VisitOutcome::Unchanged
        );
    }

    #[test]
    fn scan_reasons_are_reported() {
        let mut machine = VisitMachine::new(experience(ScoringMode::ScannedCodes));
        assert_eq!(
            machine.scan_at_current().unwrap(),
            VisitOutcome::ScanIgnored {
                reason: ScanIgnored::AtHomescreen
            }
        );
        machine.select_index(0).unwrap();
        assert_eq!(
            machine.scan_at_current().unwrap(),
            VisitOutcome::ScanIgnored {
                reason: ScanIgnored::EntryOnly
            }
        );
        machine.select_index(1).unwrap();
        assert_eq!(
            machine.scan_at_current().unwrap(),
            VisitOutcome::Scanned { delta: 1 }
        );
    }

    #[test]
    fn screen_follows_view_and_display_mode() {
        let mut machine = VisitMachine::new(experience(ScoringMode::PointsBased));
        match machine.screen() {
            Screen::Homescreen(view) => {
                assert_eq!(view.title, "Campus");
                assert_eq!(
                    view.body,
                    HomescreenBody::InitialClue {
                        clue: "Begin where the books are"
                    }
                );
            }
            Screen::Location(_) => panic!("expected homescreen"),
        }

        machine.select_index(1).unwrap();
        match machine.screen() {
            Screen::Location(view) => {
                assert_eq!(view.name, "B");
                assert!(view.scan_available);
                assert_eq!(view.clue, None);
            }
            Screen::Homescreen(_) => panic!("expected location"),
        }

        let mut exp = experience(ScoringMode::PointsBased);
        exp.project.homescreen_display = HomescreenDisplay::AllLocations;
        let machine = VisitMachine::new(exp);
        let Screen::Homescreen(view) = machine.screen() else {
            panic!("expected homescreen");
        };
        let HomescreenBody::AllLocations { entries } = view.body else {
            panic!("expected location list");
        };
        let names: Vec<_> = entries.iter().map(|e| (e.index, e.name)).collect();
        assert_eq!(names, [(0, "A"), (1, "B")]);
    }

    #[test]
    fn stats_track_points_and_visits() {
        let mut machine = VisitMachine::new(experience(ScoringMode::PointsBased));
        machine.select_index(1).unwrap();
        let stats = machine.stats();
        assert_eq!(stats.points, 3);
        assert_eq!(stats.max_points, 8);
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.total_locations, 2);
    }
}

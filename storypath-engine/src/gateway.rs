//! Read-only access to project and location records.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::records::{Location, LocationId, Project, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Project,
    Location,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Location => write!(f, "location"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },
    #[error("gateway unavailable: {0}")]
    Transport(String),
    #[error("gateway returned an unreadable record: {0}")]
    Decode(String),
}

impl GatewayError {
    #[must_use]
    pub const fn project_not_found(id: ProjectId) -> Self {
        Self::NotFound {
            kind: RecordKind::Project,
            id: id.get(),
        }
    }

    #[must_use]
    pub const fn location_not_found(id: LocationId) -> Self {
        Self::NotFound {
            kind: RecordKind::Location,
            id: id.get(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Source of the records a session is built from.
///
/// Implementations are read-only from the engine's point of view. Location
/// lists may come back in any order; callers sort them before use.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch a single project.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when no project has this id.
    async fn get_project(&self, id: ProjectId) -> Result<Project, GatewayError>;

    /// Fetch every location belonging to a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    async fn get_locations(&self, project_id: ProjectId) -> Result<Vec<Location>, GatewayError>;

    /// Fetch a single location.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when no location has this id.
    async fn get_location(&self, id: LocationId) -> Result<Location, GatewayError>;
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    locations: Vec<Location>,
}

/// In-memory record store, used for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    projects: BTreeMap<ProjectId, Project>,
    locations: BTreeMap<LocationId, Location>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new(projects: Vec<Project>, locations: Vec<Location>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
            locations: locations.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    /// Load a fixture of the form `{ "projects": [...], "locations": [...] }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe valid records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fixture: Fixture = serde_json::from_str(json)?;
        Ok(Self::new(fixture.projects, fixture.locations))
    }

    #[must_use]
    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.id, project);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.insert(location.id, location);
        self
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn get_project(&self, id: ProjectId) -> Result<Project, GatewayError> {
        self.projects
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::project_not_found(id))
    }

    async fn get_locations(&self, project_id: ProjectId) -> Result<Vec<Location>, GatewayError> {
        Ok(self
            .locations
            .values()
            .filter(|location| location.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_location(&self, id: LocationId) -> Result<Location, GatewayError> {
        self.locations
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::location_not_found(id))
    }
}

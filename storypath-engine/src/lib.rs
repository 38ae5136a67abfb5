//! StoryPath Engine
//!
//! Visit-and-scoring engine for location-based experiences. A project holds
//! ordered locations; a participant walks a simulated run of it, and the
//! engine decides what to present, tracks visits, and keeps score under the
//! project's scoring mode. Scanned codes resolve into navigation intents that
//! re-enter a session at the scanned location.
//!
//! The crate has no UI or transport dependencies. Hosts supply a
//! [`Gateway`] implementation for record access.

pub mod code;
pub mod gateway;
pub mod host;
pub mod records;
pub mod scoring;
pub mod visit;

// Re-export commonly used types
pub use code::{
    CodePayload, LocationSnapshot, NavigationIntent, PayloadError, ResolveError, encode_payload,
    redirect_path, resolve_code,
};
pub use gateway::{Gateway, GatewayError, MemoryGateway, RecordKind};
pub use host::{DisposeHandle, HostSlot, LoadError, LoadTicket, SlotOutcome, load_experience};
pub use records::{
    HomescreenDisplay, Location, LocationId, LocationTrigger, Position, Project, ProjectId,
    ScoringMode, sort_locations,
};
pub use scoring::{EventKind, score};
pub use visit::{
    Experience, HomescreenBody, HomescreenView, LocationEntry, LocationView, ScanIgnored, Screen,
    Selection, VisitError, VisitEvent, VisitMachine, VisitOutcome, VisitSession, VisitStats,
};

/// Host-facing entry point bound to one gateway.
pub struct PreviewEngine<G>
where
    G: Gateway,
{
    gateway: G,
}

impl<G> PreviewEngine<G>
where
    G: Gateway,
{
    /// Create an engine over the provided gateway
    pub const fn new(gateway: G) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Load a project and start a session at the homescreen.
    ///
    /// # Errors
    ///
    /// Returns an error if the project or its locations cannot be fetched.
    pub async fn load(&self, project_id: ProjectId) -> Result<VisitMachine, LoadError> {
        load_experience(&self.gateway, project_id)
            .await
            .map(VisitMachine::new)
    }

    /// Resolve scanned content into a navigation intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or names an unknown location.
    pub async fn resolve_code(&self, payload: &str) -> Result<NavigationIntent, ResolveError> {
        resolve_code(&self.gateway, payload).await
    }

    /// Load the session an intent points into, with its location pre-selected.
    ///
    /// The outcome is `None` when the pre-selection was skipped and the
    /// session stayed at the homescreen.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent's project cannot be loaded.
    pub async fn enter(
        &self,
        intent: &NavigationIntent,
    ) -> Result<(VisitMachine, Option<VisitOutcome>), LoadError> {
        let mut machine = self.load(intent.project_id).await?;
        let entered = machine.enter_from_intent(intent);
        Ok((machine, entered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_engine() -> PreviewEngine<MemoryGateway> {
        let mut project = Project::new(ProjectId(1), "Harbour Walk");
        project.participant_scoring = ScoringMode::LocationsEntered;
        PreviewEngine::new(
            MemoryGateway::default()
                .with_project(project)
                .with_location(Location::new(LocationId(11), ProjectId(1), "Pier", 5))
                .with_location(Location::new(LocationId(12), ProjectId(1), "Lighthouse", 3)),
        )
    }

    #[tokio::test]
    async fn engine_loads_and_walks_a_project() {
        let engine = fixture_engine();
        let mut machine = engine.load(ProjectId(1)).await.unwrap();
        machine.select_index(0).unwrap();
        machine.select_index(1).unwrap();
        machine.select_index(0).unwrap();
        assert_eq!(machine.stats().points, 2);
        assert_eq!(machine.stats().visited, 2);
    }

    #[tokio::test]
    async fn scanned_code_enters_at_location() {
        let engine = fixture_engine();
        let intent = engine.resolve_code("12").await.unwrap();
        assert!(intent.originated_from_code);
        assert_eq!(intent.project_id, ProjectId(1));

        let (machine, entered) = engine.enter(&intent).await.unwrap();
        assert_eq!(entered.map(VisitOutcome::delta), Some(1));
        assert_eq!(machine.session().current(), Selection::Location(1));
        assert_eq!(machine.stats().points, 1);
    }

    #[tokio::test]
    async fn intent_for_missing_location_stays_at_homescreen() {
        let engine = fixture_engine();
        let mut intent = engine.resolve_code("12").await.unwrap();
        intent.initial_location.id = LocationId(99);

        let (machine, entered) = engine.enter(&intent).await.unwrap();
        assert_eq!(entered, None);
        assert_eq!(machine.session().current(), Selection::Homescreen);
        assert_eq!(machine.stats().points, 0);
    }

    #[tokio::test]
    async fn unknown_project_fails_to_load() {
        let engine = fixture_engine();
        assert!(matches!(
            engine.load(ProjectId(2)).await,
            Err(LoadError::NotFound { .. })
        ));
    }
}

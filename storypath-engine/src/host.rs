//! Session loading at the data boundary.
//!
//! Project and locations are fetched concurrently and a session is only
//! built once both have arrived. A [`HostSlot`] owns the running session for
//! a host view; loads are stamped with the slot generation so that a result
//! arriving after the view was disposed is dropped instead of installed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::code::NavigationIntent;
use crate::gateway::{Gateway, GatewayError};
use crate::records::ProjectId;
use crate::visit::{Experience, VisitMachine, VisitOutcome};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("project {project_id} not found")]
    NotFound {
        project_id: ProjectId,
        #[source]
        source: GatewayError,
    },
    #[error("failed to load project {project_id}")]
    GatewayFailure {
        project_id: ProjectId,
        #[source]
        source: GatewayError,
    },
}

impl LoadError {
    fn from_gateway(project_id: ProjectId, source: GatewayError) -> Self {
        if source.is_not_found() {
            Self::NotFound { project_id, source }
        } else {
            Self::GatewayFailure { project_id, source }
        }
    }
}

/// Fetch a project and its locations, both or nothing.
///
/// # Errors
///
/// [`LoadError::NotFound`] if the project is missing, otherwise
/// [`LoadError::GatewayFailure`] for any gateway error.
pub async fn load_experience(
    gateway: &dyn Gateway,
    project_id: ProjectId,
) -> Result<Experience, LoadError> {
    let (project, locations) = tokio::try_join!(
        gateway.get_project(project_id),
        gateway.get_locations(project_id)
    )
    .map_err(|source| LoadError::from_gateway(project_id, source))?;
    debug!(
        "loaded project {project_id} with {} locations",
        locations.len()
    );
    Ok(Experience::new(project, locations))
}

/// Stamp handed out when a load starts.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    live: Arc<AtomicU64>,
}

impl LoadTicket {
    /// Whether the slot that issued this ticket still expects the result.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.live.load(Ordering::Acquire) == self.generation
    }
}

/// Tears a slot down from elsewhere, e.g. when the host navigates away
/// while a load is in flight.
#[derive(Debug, Clone)]
pub struct DisposeHandle {
    live: Arc<AtomicU64>,
}

impl DisposeHandle {
    pub fn dispose(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// A session is running; carries the pre-selection made for a code entry.
    Installed { entered: Option<VisitOutcome> },
    /// The slot was disposed or reloaded before the result arrived.
    Discarded,
}

/// Owner of the one running session for a host view.
#[derive(Debug, Default)]
pub struct HostSlot {
    live: Arc<AtomicU64>,
    running: Option<(u64, VisitMachine)>,
}

impl HostSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load, invalidating any earlier ticket and session.
    pub fn begin_load(&mut self) -> LoadTicket {
        let generation = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        self.running = None;
        LoadTicket {
            generation,
            live: Arc::clone(&self.live),
        }
    }

    #[must_use]
    pub fn dispose_handle(&self) -> DisposeHandle {
        DisposeHandle {
            live: Arc::clone(&self.live),
        }
    }

    pub fn dispose(&mut self) {
        self.dispose_handle().dispose();
        self.running = None;
    }

    /// Install a loaded experience if `ticket` is still current, then
    /// pre-select the intent's location.
    pub fn install(
        &mut self,
        ticket: &LoadTicket,
        experience: Experience,
        intent: Option<&NavigationIntent>,
    ) -> SlotOutcome {
        if !ticket.is_current() {
            warn!(
                "discarding late load of project {}",
                experience.project().id
            );
            return SlotOutcome::Discarded;
        }
        let mut machine = VisitMachine::new(experience);
        let entered = intent.and_then(|intent| machine.enter_from_intent(intent));
        self.running = Some((ticket.generation, machine));
        SlotOutcome::Installed { entered }
    }

    /// Load `project_id` through `gateway` and install it.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] of a failed load; no session is installed.
    /// A failure that arrives after disposal is still reported, but the slot
    /// stays empty either way.
    pub async fn open(
        &mut self,
        gateway: &dyn Gateway,
        project_id: ProjectId,
        intent: Option<&NavigationIntent>,
    ) -> Result<SlotOutcome, LoadError> {
        let ticket = self.begin_load();
        let experience = load_experience(gateway, project_id).await?;
        let outcome = self.install(&ticket, experience, intent);
        if matches!(outcome, SlotOutcome::Installed { .. }) {
            info!("session ready for project {project_id}");
        }
        Ok(outcome)
    }

    fn is_live(&self, generation: u64) -> bool {
        self.live.load(Ordering::Acquire) == generation
    }

    /// The running session, unless the slot was disposed.
    #[must_use]
    pub fn machine(&self) -> Option<&VisitMachine> {
        match &self.running {
            Some((generation, machine)) if self.is_live(*generation) => Some(machine),
            _ => None,
        }
    }

    pub fn machine_mut(&mut self) -> Option<&mut VisitMachine> {
        let live = self.live.load(Ordering::Acquire);
        match &mut self.running {
            Some((generation, machine)) if *generation == live => Some(machine),
            _ => None,
        }
    }
}

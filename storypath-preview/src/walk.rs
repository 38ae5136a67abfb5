//! Scripted participant walks through a loaded session.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use serde::Serialize;
use storypath_engine::{
    LocationId, ProjectId, ScoringMode, Screen, Selection, VisitError, VisitMachine, VisitOutcome,
    VisitStats,
};

use crate::util::split_csv;

/// One scripted participant action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Home,
    Select(i64),
    Goto(LocationId),
    Scan,
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_lowercase();
        match token.split_once(':') {
            None if token == "home" => Ok(Self::Home),
            None if token == "scan" => Ok(Self::Scan),
            Some(("select", index)) => index
                .trim()
                .parse()
                .map(Self::Select)
                .map_err(|_| anyhow!("invalid index in step `{s}`")),
            Some(("goto", id)) => id
                .parse()
                .map(Self::Goto)
                .map_err(|_| anyhow!("invalid location id in step `{s}`")),
            _ => bail!("unknown step `{s}` (expected home, scan, select:<index>, goto:<location id>)"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::Select(index) => write!(f, "select:{index}"),
            Self::Goto(id) => write!(f, "goto:{id}"),
            Self::Scan => write!(f, "scan"),
        }
    }
}

/// Parse a comma-separated step script.
///
/// # Errors
///
/// Returns an error naming the first step that cannot be parsed.
pub fn parse_steps(script: &str) -> Result<Vec<Step>> {
    split_csv(script).iter().map(|token| token.parse()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Visit(#[from] VisitError),
    #[error("location {0} is not part of this project")]
    UnknownLocation(LocationId),
}

fn apply_step(machine: &mut VisitMachine, step: Step) -> Result<VisitOutcome, StepError> {
    let outcome = match step {
        Step::Home => machine.select_location(Selection::Homescreen)?,
        Step::Select(index) => machine.select_index(index)?,
        Step::Goto(id) => {
            let index = machine
                .index_of(id)
                .ok_or(StepError::UnknownLocation(id))?;
            machine.select_location(Selection::Location(index))?
        }
        Step::Scan => machine.scan_at_current()?,
    };
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VisitOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Label of the view after the step.
    pub view: String,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkReport {
    pub project_id: ProjectId,
    pub title: String,
    pub scoring: ScoringMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_from_code: Option<LocationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<VisitOutcome>,
    pub steps: Vec<StepRecord>,
    pub stats: VisitStats,
    pub visited: Vec<LocationId>,
    /// Final screen, as the host would present it.
    pub screen: serde_json::Value,
    pub generated_at: String,
}

impl WalkReport {
    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.error.is_some()).count()
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failed_steps() == 0
    }
}

fn view_label(machine: &VisitMachine) -> String {
    match machine.screen() {
        Screen::Homescreen(_) => "homescreen".to_string(),
        Screen::Location(view) => format!("#{} {}", view.index, view.name),
    }
}

/// How the session was entered before the scripted steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Entry {
    pub from_code: Option<LocationId>,
    pub outcome: Option<VisitOutcome>,
}

/// Run `steps` against `machine`, recording every outcome.
///
/// A failing step is recorded and the walk continues with the next one.
///
/// # Errors
///
/// Returns an error only if the final screen cannot be serialised.
pub fn run_walk(machine: &mut VisitMachine, entry: Entry, steps: &[Step]) -> Result<WalkReport> {
    let records = steps
        .iter()
        .map(|&step| {
            let (outcome, error) = match apply_step(machine, step) {
                Ok(outcome) => (Some(outcome), None),
                Err(err) => {
                    log::warn!("step {step} failed: {err}");
                    (None, Some(err.to_string()))
                }
            };
            StepRecord {
                step: step.to_string(),
                outcome,
                error,
                view: view_label(machine),
                points: machine.session().points(),
            }
        })
        .collect();

    let project = machine.project();
    Ok(WalkReport {
        project_id: project.id,
        title: project.title.clone(),
        scoring: project.participant_scoring,
        entered_from_code: entry.from_code,
        entry: entry.outcome,
        steps: records,
        stats: machine.stats(),
        visited: machine.session().visited().iter().copied().collect(),
        screen: serde_json::to_value(machine.screen())?,
        generated_at: Utc::now().to_rfc3339(),
    })
}

use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use storypath_engine::{Location, NavigationIntent, VisitOutcome};

use crate::walk::WalkReport;

/// Generated code content for one location.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadReport<'a> {
    pub location: &'a Location,
    pub payload: String,
    pub redirect: String,
}

pub fn generate_json_report<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    let json_output = serde_json::to_string_pretty(value)?;
    writeln!(writer, "{json_output}")?;
    Ok(())
}

fn describe_outcome(outcome: &VisitOutcome) -> String {
    match outcome {
        VisitOutcome::Unchanged => "unchanged".to_string(),
        VisitOutcome::Moved {
            first_visit, delta, ..
        } => {
            let visit = if *first_visit { "first visit" } else { "revisit" };
            format!("moved ({visit}, +{delta})")
        }
        VisitOutcome::Scanned { delta } => format!("scanned (+{delta})"),
        VisitOutcome::ScanIgnored { reason } => format!("scan ignored ({reason:?})"),
    }
}

pub fn generate_walk_console_report<W: Write>(writer: &mut W, report: &WalkReport) -> Result<()> {
    writeln!(writer)?;
    writeln!(
        writer,
        "{}",
        format!("🧭 {} (project {})", report.title, report.project_id)
            .bright_cyan()
            .bold()
    )?;
    writeln!(writer, "{}", "================================".cyan())?;
    writeln!(writer, "Scoring: {}", report.scoring)?;
    if let Some(id) = report.entered_from_code {
        let entry = report
            .entry
            .as_ref()
            .map_or_else(|| "not selected".to_string(), describe_outcome);
        writeln!(writer, "Entered from code at location {id}: {entry}")?;
    }
    writeln!(writer)?;

    for (n, step) in report.steps.iter().enumerate() {
        let status = match (&step.outcome, &step.error) {
            (Some(outcome), _) => describe_outcome(outcome).green(),
            (None, Some(error)) => error.as_str().red(),
            (None, None) => "no outcome".yellow(),
        };
        writeln!(
            writer,
            "{:>3}. {:<14} {status}  → {} [{} pts]",
            n + 1,
            step.step.bold(),
            step.view,
            step.points
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Session Summary".bright_yellow().bold())?;
    writeln!(writer, "{}", "==================".yellow())?;
    writeln!(
        writer,
        "Points: {}/{}",
        report.stats.points.to_string().green(),
        report.stats.max_points
    )?;
    writeln!(
        writer,
        "Visited: {}/{}",
        report.stats.visited, report.stats.total_locations
    )?;
    let failed = report.failed_steps();
    if failed == 0 {
        writeln!(writer, "Steps: {} ✅", report.steps.len())?;
    } else {
        writeln!(
            writer,
            "Steps: {} ({} failed)",
            report.steps.len(),
            failed.to_string().red()
        )?;
    }
    Ok(())
}

pub fn generate_intent_console_report<W: Write>(
    writer: &mut W,
    intent: &NavigationIntent,
) -> Result<()> {
    let location = &intent.initial_location;
    writeln!(writer, "{}", "🔗 Code resolved".bright_green().bold())?;
    writeln!(writer, "Project: {}", intent.project_id)?;
    writeln!(
        writer,
        "Location: {} ({})",
        location.location_name.bold(),
        location.id
    )?;
    writeln!(writer, "Trigger: {}", location.location_trigger)?;
    Ok(())
}

pub fn generate_payload_console_report<W: Write>(
    writer: &mut W,
    report: &PayloadReport<'_>,
) -> Result<()> {
    writeln!(
        writer,
        "{}",
        format!("🏷️  Code for {}", report.location.location_name)
            .bright_cyan()
            .bold()
    )?;
    if !report.location.location_trigger.accepts_code() {
        writeln!(
            writer,
            "{}",
            "⚠️  This location is entry-only; scans here will not score.".yellow()
        )?;
    }
    writeln!(writer, "Payload:  {}", report.payload)?;
    writeln!(writer, "Redirect: {}", report.redirect)?;
    Ok(())
}

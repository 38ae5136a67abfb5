mod config;
mod reports;
mod rest;
mod util;
mod walk;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};

use config::{ConfigOverrides, GatewayConfig};
use reports::PayloadReport;
use rest::RestGateway;
use storypath_engine::{
    Gateway, HostSlot, LocationId, MemoryGateway, ProjectId, SlotOutcome, encode_payload,
    redirect_path, resolve_code,
};
use walk::{Entry, parse_steps, run_walk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored, human-readable summary
    Console,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "storypath-preview", version)]
#[command(about = "Preview StoryPath projects: walk a session, resolve scanned codes, print codes")]
struct Args {
    /// Read records from a JSON fixture instead of the REST API
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// JSON file with gateway settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the REST API
    #[arg(long, global = true, env = "STORYPATH_API_BASE")]
    api_base: Option<String>,

    /// Bearer token for the REST API
    #[arg(long, global = true, env = "STORYPATH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Author whose projects are previewed
    #[arg(long, global = true, env = "STORYPATH_USERNAME")]
    username: Option<String>,

    /// Output report format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a project and run a scripted participant walk
    Walk {
        /// Project to load (taken from the code when --code is given)
        #[arg(long)]
        project: Option<ProjectId>,

        /// Enter the session through this scanned code payload
        #[arg(long)]
        code: Option<String>,

        /// Comma-separated steps: home, scan, select:<index>, goto:<location id>
        #[arg(long, default_value = "")]
        steps: String,
    },
    /// Resolve scanned code content into a navigation intent
    Resolve {
        /// Raw scanned content: a location id, a JSON record, or a /location/ link
        payload: String,
    },
    /// Print the code content generated for a location
    Payload {
        #[arg(long)]
        location: LocationId,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Runs the selected command; `Ok(false)` means the report was written but
/// recorded failures.
async fn run(args: &Args) -> Result<bool> {
    let gateway = build_gateway(args)?;
    let mut output_target = OutputTarget::new(args.output.clone())?;

    let passed = match &args.command {
        Command::Walk {
            project,
            code,
            steps,
        } => {
            run_walk_command(
                args,
                gateway.as_ref(),
                &mut output_target,
                *project,
                code.as_deref(),
                steps,
            )
            .await?
        }
        Command::Resolve { payload } => {
            let intent = resolve_code(gateway.as_ref(), payload).await?;
            match args.report {
                ReportFormat::Json => reports::generate_json_report(&mut output_target, &intent)?,
                ReportFormat::Console => {
                    reports::generate_intent_console_report(&mut output_target, &intent)?;
                }
            }
            true
        }
        Command::Payload { location } => {
            let location = gateway
                .get_location(*location)
                .await
                .with_context(|| format!("failed to fetch location {location}"))?;
            let report = PayloadReport {
                location: &location,
                payload: encode_payload(&location),
                redirect: redirect_path(&location),
            };
            match args.report {
                ReportFormat::Json => reports::generate_json_report(&mut output_target, &report)?,
                ReportFormat::Console => {
                    reports::generate_payload_console_report(&mut output_target, &report)?;
                }
            }
            true
        }
    };

    output_target.flush_inner()?;
    Ok(passed)
}

fn build_gateway(args: &Args) -> Result<Box<dyn Gateway>> {
    if let Some(path) = &args.fixture {
        return Ok(Box::new(load_fixture(path)?));
    }
    let overrides = ConfigOverrides {
        api_base: args.api_base.clone(),
        token: args.token.clone(),
        username: args.username.clone(),
    };
    let config = GatewayConfig::resolve(args.config.as_deref(), overrides)?;
    log::debug!("using REST gateway {config:?}");
    Ok(Box::new(RestGateway::new(config)?))
}

fn load_fixture(path: &Path) -> Result<MemoryGateway> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let gateway = MemoryGateway::from_json(&text)
        .with_context(|| format!("invalid fixture {}", path.display()))?;
    log::info!(
        "loaded fixture {} with {} projects",
        path.display(),
        gateway.projects().count()
    );
    Ok(gateway)
}

async fn run_walk_command(
    args: &Args,
    gateway: &dyn Gateway,
    output_target: &mut OutputTarget,
    project: Option<ProjectId>,
    code: Option<&str>,
    script: &str,
) -> Result<bool> {
    let steps = parse_steps(script)?;

    let intent = match code {
        Some(code) => Some(resolve_code(gateway, code).await?),
        None => None,
    };
    let project_id = match (project, &intent) {
        (Some(project), Some(intent)) if project != intent.project_id => bail!(
            "code belongs to project {}, not project {project}",
            intent.project_id
        ),
        (_, Some(intent)) => intent.project_id,
        (Some(project), None) => project,
        (None, None) => bail!("walk needs --project or --code"),
    };

    let mut slot = HostSlot::new();
    let entered = match slot.open(gateway, project_id, intent.as_ref()).await? {
        SlotOutcome::Installed { entered } => entered,
        SlotOutcome::Discarded => bail!("session for project {project_id} was discarded"),
    };
    let Some(machine) = slot.machine_mut() else {
        bail!("no running session for project {project_id}");
    };

    let entry = Entry {
        from_code: intent.as_ref().map(|intent| intent.initial_location.id),
        outcome: entered,
    };
    let report = run_walk(machine, entry, &steps)?;

    match args.report {
        ReportFormat::Json => reports::generate_json_report(output_target, &report)?,
        ReportFormat::Console => reports::generate_walk_console_report(output_target, &report)?,
    }
    slot.dispose();
    Ok(report.passed())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use duckbug_core::config::{self, LoggingConfig};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter directive env var; overrides the config file.
const LOG_ENV: &str = "DUCKBUG_LOG";
/// `json` or `compact`; overrides the config file.
const LOG_FORMAT_ENV: &str = "DUCKBUG_LOG_FORMAT";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "duckbug: group error and log events, track their status, and count occurrences",
    long_about = None
)]
struct Cli {
    /// Config file (default: `$DUCKBUG_CONFIG`, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store file (overrides `$DUCKBUG_DB` and the config file).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (default: pretty on a terminal, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output; same as `--format json`.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Store",
        about = "Create or migrate the event store",
        long_about = "Create the store file if needed and apply pending schema migrations.",
        after_help = "EXAMPLES:\n    # Initialize the default store\n    duckbug init\n\n    # Use an explicit store file\n    duckbug --db ./duckbug.sqlite3 init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Write",
        about = "Ingest events from JSON lines",
        long_about = "Ingest one event per JSON line into the error or log pipeline, grouping by fingerprint.",
        after_help = "EXAMPLES:\n    # Ingest error events from a file\n    duckbug ingest error --file errors.jsonl\n\n    # Pipe log events in\n    tail -f app.jsonl | duckbug ingest log"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        next_help_heading = "Read",
        about = "List, show, triage and delete groups",
        long_about = "Inspect groups and change their status (unresolved, resolved, ignored).",
        after_help = "EXAMPLES:\n    # Unresolved error groups of one project\n    duckbug groups error list --project p1 --status unresolved\n\n    # Resolve several groups at once\n    duckbug groups error status resolved f1 f2 f3"
    )]
    Groups(cmd::groups::GroupsArgs),

    #[command(
        next_help_heading = "Read",
        about = "List, show, patch and delete events",
        long_about = "Inspect individual events, filtered by project, fingerprint, time range, text or level.",
        after_help = "EXAMPLES:\n    # Recent warnings\n    duckbug events log list --level warn --limit 20\n\n    # Fix a message\n    duckbug events error update <id> --patch '{\"message\":\"boom\"}'"
    )]
    Events(cmd::events::EventsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Occurrence counts over the last 24h, 7d and 30d",
        long_about = "Count events per trailing window for one project (optionally one group) or several projects.",
        after_help = "EXAMPLES:\n    # One group\n    duckbug stats error --project p1 --fingerprint f1\n\n    # Several projects with open group counts\n    duckbug stats error --projects p1,p2 --groups unresolved --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Open errors and log volume per project",
        after_help = "EXAMPLES:\n    duckbug overview p1 p2 --json"
    )]
    Overview(cmd::overview::OverviewArgs),
}

/// Default filter when neither `DUCKBUG_LOG` nor the config sets one.
const fn default_filter(debug: bool) -> &'static str {
    if debug {
        "duckbug=debug,info"
    } else {
        "duckbug=info,warn"
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .ok()
        .or_else(|| {
            logging
                .level
                .as_deref()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new(default_filter(env::var_os("DEBUG").is_some())));

    let format = env::var(LOG_FORMAT_ENV)
        .ok()
        .or_else(|| logging.format.clone())
        .unwrap_or_else(|| "compact".to_string());

    // Logs go to stderr so stdout stays parseable.
    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let store_path = config::resolve_store_path(&config.store, cli.db.as_deref());
    tracing::debug!(store = %store_path.display(), "resolved store path");
    let ctx = cmd::Context {
        config,
        store_path,
        output,
    };

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::Ingest(args) => cmd::ingest::run_ingest(args, &ctx),
        Commands::Groups(args) => cmd::groups::run_groups(args, &ctx),
        Commands::Events(args) => cmd::events::run_events(args, &ctx),
        Commands::Stats(args) => cmd::stats::run_stats(args, &ctx),
        Commands::Overview(args) => cmd::overview::run_overview(args, &ctx),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = cli.output_mode();

    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

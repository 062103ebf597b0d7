//! Main CLI application structure

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{ad, cache_cmd, category, tag};
use crate::domain::{CoreError, UserId};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "adboard")]
#[command(author, version, about = "Local-first classified ads with a category tree")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Act as this user instead of the configured one
    #[arg(long = "as", value_name = "USER", global = true)]
    pub as_user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new adboard project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage the category tree
    #[command(subcommand)]
    Category(category::CategoryCommands),

    /// Manage advertisements
    #[command(subcommand)]
    Ad(ad::AdCommands),

    /// Manage tags
    #[command(subcommand)]
    Tag(tag::TagCommands),

    /// Manage the SQLite index
    #[command(subcommand)]
    Cache(cache_cmd::CacheCommands),
}

/// What every subcommand gets from the global flags
pub struct Context {
    pub output: Output,
    as_user: Option<String>,
}

impl Context {
    /// Opens the project containing the current directory
    pub fn project(&self) -> Result<Project> {
        Project::open_current()
    }

    /// The acting user: `--as`, then the configured user
    pub fn actor(&self, project: &Project) -> Result<UserId> {
        match &self.as_user {
            Some(name) => UserId::new(name).with_context(|| format!("Invalid --as value: {:?}", name)),
            None => project.config().effective_user(),
        }
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    init_tracing(cli.verbose, &config.project.log_level);

    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let ctx = Context {
        output: Output::new(format),
        as_user: cli.as_user,
    };

    let result = dispatch(cli.command, &ctx);
    if let Err(err) = &result {
        ctx.output.error(error_code(err), &format!("{:#}", err));
    }
    result
}

fn dispatch(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Init { path } => {
            let project = Project::init(&path)?;
            debug!(root = %project.root().display(), "initialized");
            ctx.output.success(&format!(
                "Initialized adboard project at {}",
                project.root().display()
            ));
            Ok(())
        }
        Commands::Category(cmd) => category::run(cmd, ctx),
        Commands::Ad(cmd) => ad::run(cmd, ctx),
        Commands::Tag(cmd) => tag::run(cmd, ctx),
        Commands::Cache(cmd) => cache_cmd::run(cmd, &ctx.output),
    }
}

/// Logs go to stderr so they never mix with command output.
///
/// `--verbose` wins, then `ADBOARD_LOG`, then the configured level.
fn init_tracing(verbose: bool, configured: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("ADBOARD_LOG")
            .or_else(|_| EnvFilter::try_new(configured))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A subscriber may already be installed when embedded; keep it
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Stable code for an error, `GEN-001` when it is not a domain error
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CoreError>())
        .map_or("GEN-001", CoreError::code)
}

/// Parses `YYYY-MM-DD` (end of that day, UTC) or an RFC 3339 timestamp
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("Invalid date '{}': use YYYY-MM-DD or RFC 3339", s))
}

mod exit_codes;
mod import;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Scheduled importer for CRM export bundles
#[derive(Parser)]
#[command(name = "crmsync")]
#[command(about = "Reconcile CRM export bundles into the local database", long_about = None)]
#[command(version, long_version = long_version())]
#[command(after_help = "\
Examples:
  crmsync import /srv/exports/2026-10-17 --subsidiary t
  crmsync import ./export --config import.toml --keep-going --json
  crmsync validate ./export
  crmsync stats --json")]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an export bundle into the database
    Import {
        /// Bundle root: firms/, contacts/, proposal_sheets/, proposal_lines/
        root: PathBuf,

        /// SQLite database [default: <data dir>/crmsync/crm.sqlite]
        #[arg(long)]
        db: Option<PathBuf>,

        /// Subsidiary code stamped on every imported lead
        #[arg(long, env = "CRMSYNC_SUBSIDIARY")]
        subsidiary: Option<String>,

        /// TOML import settings; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Aggregate proposal lines into missions
        #[arg(long)]
        missions: bool,

        /// Record failing records and continue instead of aborting
        #[arg(long)]
        keep_going: bool,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Parse a bundle without touching the database
    Validate {
        /// Bundle root
        root: PathBuf,

        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show entity counts of a database
    Stats {
        /// SQLite database [default: <data dir>/crmsync/crm.sqlite]
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    #[cfg(debug_assertions)]
    {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\ncommit: ",
            env!("GIT_COMMIT_HASH"),
            "\ntarget: ",
            env!("TARGET"),
            "\nprofile: debug"
        )
    }
    #[cfg(not(debug_assertions))]
    {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\ncommit: ",
            env!("GIT_COMMIT_HASH"),
            "\ntarget: ",
            env!("TARGET")
        )
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Import {
            root,
            db,
            subsidiary,
            config,
            missions,
            keep_going,
            json,
            output,
        } => import::cmd_import(import::ImportArgs {
            root,
            db,
            subsidiary,
            config,
            missions,
            keep_going,
            json,
            output,
        }),
        Commands::Validate { root, json } => import::cmd_validate(&root, json),
        Commands::Stats { db, json } => import::cmd_stats(db, json),
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::EXIT_SUCCESS),
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("error: {}", e.message);
            }
            if let Some(hint) = &e.hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(e.code)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(exit_codes::EXIT_USAGE, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(exit_codes::EXIT_STORAGE, message)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<crmsync_recon::ImportError> for CliError {
    fn from(e: crmsync_recon::ImportError) -> Self {
        Self::new(exit_codes::import_exit_code(&e), e.to_string())
    }
}

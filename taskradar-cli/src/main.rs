use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod calendar;
mod config;
mod parse;
mod state;
mod tasks;

use calendar::CalendarCommand;
use state::Session;
use tasks::{PrereqCommand, TaskCommand};

#[derive(Parser, Debug)]
#[command(
    name = "taskradar",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TASKRADAR_BUILD_SHA"), ")"),
    about = "Tasks, prerequisites, a daily coin budget and a calendar"
)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, edit and inspect tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Prerequisite edges between tasks
    Prereq {
        #[command(subcommand)]
        command: PrereqCommand,
    },

    /// Today's coin budget (spent = cost of pending and in-progress tasks)
    Budget {
        /// YYYY-MM-DD (default: today in the configured timezone)
        #[arg(long)]
        date: Option<String>,

        /// Set the day's total before reporting
        #[arg(long)]
        total: Option<i64>,
    },

    /// Events, recurrence and conflicts
    Calendar {
        #[command(subcommand)]
        command: CalendarCommand,
    },

    /// Inspect, validate or repair the workspace file
    Storage {
        #[command(subcommand)]
        command: StorageCommand,
    },

    /// Manage ~/.taskradar/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum StorageCommand {
    Info,

    /// Check the workspace file without loading it
    Validate,

    /// Restore the newest valid backup if the workspace file is broken
    Repair,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config.toml if none exists
    Init,

    Show,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if std::env::var("TASKRADAR_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Task { command } => {
            let mut session = Session::open()?;
            tasks::run_task(command, &mut session)?;
        }

        Command::Prereq { command } => {
            let mut session = Session::open()?;
            tasks::run_prereq(command, &mut session)?;
        }

        Command::Budget { date, total } => {
            let mut session = Session::open()?;
            tasks::run_budget(date, total, &mut session)?;
        }

        Command::Calendar { command } => {
            let mut session = Session::open()?;
            calendar::run(command, &mut session)?;
        }

        Command::Storage { command } => run_storage(command)?,

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
    }

    Ok(())
}

/// Works on the file directly so a broken workspace can still be inspected.
fn run_storage(command: StorageCommand) -> Result<()> {
    let cfg = config::load_config()?;
    let file = state::workspace_file(&cfg)?;

    match command {
        StorageCommand::Info => {
            let info = file.storage_info()?;
            println!("Workspace: {}", info.path.display());
            if info.exists {
                println!("  size:     {} bytes", info.size_bytes);
                if let Some(m) = info.modified {
                    println!("  modified: {}", m.to_rfc3339());
                }
            } else {
                println!("  (not created yet)");
            }
            println!("Backups:   {} in {}", info.backup_count, info.backup_dir.display());
        }

        StorageCommand::Validate => {
            let report = file.validate()?;
            if report.is_valid() {
                println!("OK: {}", file.path().display());
            } else {
                for issue in &report.issues {
                    println!("- {issue}");
                }
                bail!("{} problem(s) in {}", report.issues.len(), file.path().display());
            }
        }

        StorageCommand::Repair => match file.repair()? {
            taskradar_store::RepairOutcome::AlreadyValid => println!("Nothing to repair."),
            taskradar_store::RepairOutcome::Restored { from } => {
                println!("Restored workspace from {}", from.display());
            }
        },
    }

    Ok(())
}

//! Talon CLI — offline inspection of the agent workspace.
//!
//! Commands:
//! - `workflow`  — list, show, and validate stored workflow definitions
//! - `cron`      — list scheduled jobs
//! - `schedule`  — convert a natural-language phrase to a cron expression
//! - `check`     — run a shell command through the safety filter
//!
//! Everything here works without an engine; running workflows and services
//! is the host application's job.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use talon_scheduler::{CronExpr, load_jobs, parse_phrase};
use talon_security::check_command;
use talon_workflow::WorkflowStore;

#[derive(Parser)]
#[command(
    name = "talon",
    about = "Talon — execution core of an autonomous agent runtime.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (holds cron/, workflows/, HEARTBEAT.md)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect stored workflow definitions
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Inspect scheduled cron jobs
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },

    /// Convert a scheduling phrase to a cron expression
    Schedule {
        /// e.g. "every day at 9am" or a raw cron expression
        phrase: String,
    },

    /// Check a shell command against the safety filter
    Check {
        /// The command to check
        command: String,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List stored workflows
    List,
    /// Show one workflow in detail
    Show { name: String },
    /// Validate a workflow definition
    Validate { name: String },
}

#[derive(Subcommand)]
enum CronAction {
    /// List scheduled jobs
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Workflow { action } => workflow_command(&cli.workspace, action),
        Commands::Cron { action } => cron_command(&cli.workspace, action),
        Commands::Schedule { phrase } => schedule_command(&phrase),
        Commands::Check { command } => check_command_line(&command),
    }
}

fn workflow_command(workspace: &std::path::Path, action: WorkflowAction) -> anyhow::Result<()> {
    let store = WorkflowStore::new(workspace.join("workflows"));

    match action {
        WorkflowAction::List => {
            let names = store.list();
            if names.is_empty() {
                println!("No workflows found.");
                return Ok(());
            }
            for name in names {
                match store.load(&name) {
                    Some(wf) => {
                        let layers = wf.get_execution_order();
                        println!("{name}: {} steps, {} layers", wf.steps.len(), layers.len());
                    }
                    None => println!("{name}: (failed to load)"),
                }
            }
        }
        WorkflowAction::Show { name } => {
            let wf = store
                .load(&name)
                .with_context(|| format!("workflow '{name}' not found"))?;
            println!("Workflow: {}", wf.name);
            if !wf.description.is_empty() {
                println!("Description: {}", wf.description);
            }
            println!("Steps:");
            for step in &wf.steps {
                let deps = if step.depends_on.is_empty() {
                    "(none)".to_string()
                } else {
                    step.depends_on.join(", ")
                };
                println!(
                    "  {} [profile: {}, timeout: {}s] depends on: {deps}",
                    step.name, step.profile, step.timeout_seconds
                );
            }
            println!("Execution order:");
            for (i, layer) in wf.get_execution_order().iter().enumerate() {
                println!("  layer {}: {}", i + 1, layer.join(", "));
            }
        }
        WorkflowAction::Validate { name } => {
            let wf = store
                .load(&name)
                .with_context(|| format!("workflow '{name}' not found"))?;
            let errors = wf.validate();
            if errors.is_empty() {
                println!("Workflow '{name}' is valid.");
            } else {
                for error in &errors {
                    eprintln!("  - {error}");
                }
                bail!("workflow '{name}' failed validation ({} errors)", errors.len());
            }
        }
    }
    Ok(())
}

fn cron_command(workspace: &std::path::Path, action: CronAction) -> anyhow::Result<()> {
    match action {
        CronAction::List => {
            let jobs = load_jobs(&workspace.join("cron"));
            if jobs.is_empty() {
                println!("No scheduled jobs.");
                return Ok(());
            }
            for job in jobs {
                let state = if job.enabled { "enabled" } else { "disabled" };
                let last_run = job
                    .last_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{} [{state}] {} — schedule: {} | last run: {last_run}",
                    job.id, job.name, job.schedule
                );
            }
        }
    }
    Ok(())
}

fn schedule_command(phrase: &str) -> anyhow::Result<()> {
    match parse_phrase(phrase) {
        Some(cron) => {
            CronExpr::parse(&cron)
                .map_err(|e| anyhow::anyhow!("'{phrase}' produced invalid cron '{cron}': {e}"))?;
            println!("{cron}");
            Ok(())
        }
        None => bail!(
            "could not parse '{phrase}'. Try: 'every 5 minutes', 'every day at 9am', \
             'every Monday at 3pm', or a raw cron expression."
        ),
    }
}

fn check_command_line(command: &str) -> anyhow::Result<()> {
    match check_command(command) {
        None => {
            println!("safe");
            Ok(())
        }
        Some(reason) => {
            println!("blocked: {reason}");
            std::process::exit(1);
        }
    }
}

#![forbid(unsafe_code)]

//! `migration-watchdog`: run migration plans under per-operation deadlines.
//!
//! Loads configuration and a migration plan, runs it forward or backward
//! against the configured Postgres connection, and records the outcome in
//! the `SQLite` run ledger.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use migration_watchdog::config::GlobalConfig;
use migration_watchdog::db::postgres::PgConnector;
use migration_watchdog::models::migration::{Direction, MigrationRun};
use migration_watchdog::models::outcome::Outcome;
use migration_watchdog::models::policy::{CancellationMethod, PolicyOverrides};
use migration_watchdog::orchestrator::runner::TimedMigrationRunner;
use migration_watchdog::orchestrator::session_registry::SessionRegistry;
use migration_watchdog::persistence::db;
use migration_watchdog::persistence::ledger_repo::LedgerRepo;
use migration_watchdog::plan::MigrationPlan;
use migration_watchdog::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "migration-watchdog",
    about = "Run database migrations under per-operation deadlines",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a migration plan.
    Apply(RunArgs),
    /// Reverse a migration plan.
    Unapply(RunArgs),
    /// Show recorded runs of a migration.
    History {
        /// Application label.
        app_label: String,
        /// Migration name.
        migration: String,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the migration plan file.
    plan: PathBuf,

    /// Per-operation deadline in seconds.
    #[arg(long, conflicts_with = "no_deadline")]
    deadline: Option<f64>,

    /// Disable the deadline.
    #[arg(long)]
    no_deadline: bool,

    /// Cancellation method used when the deadline expires.
    #[arg(long, value_enum)]
    method: Option<CancellationMethod>,

    /// Terminate the whole session instead of cancelling the statement.
    #[arg(long)]
    unsafe_interrupt: bool,

    /// Run even when the ledger says there is nothing to do.
    #[arg(long)]
    force: bool,
}

impl RunArgs {
    fn overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            deadline_seconds: self.deadline,
            no_deadline: self.no_deadline,
            cancellation_method: self.method,
            unsafe_interrupt: self.unsafe_interrupt,
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    info!(config = %args.config.display(), "configuration loaded");

    // ── Initialize ledger ───────────────────────────────
    let ledger = LedgerRepo::new(Arc::new(db::connect(&config.ledger_path).await?));

    match args.command {
        Command::Apply(run_args) => {
            config.load_credentials().await?;
            execute(&config, &ledger, &run_args, Direction::Forward).await
        }
        Command::Unapply(run_args) => {
            config.load_credentials().await?;
            execute(&config, &ledger, &run_args, Direction::Backward).await
        }
        Command::History {
            app_label,
            migration,
        } => {
            print_history(&ledger, &app_label, &migration).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn execute(
    config: &GlobalConfig,
    ledger: &LedgerRepo,
    args: &RunArgs,
    direction: Direction,
) -> Result<ExitCode> {
    let plan = MigrationPlan::load_from_path(&args.plan)?;
    config.connection(&plan.connection)?;

    let applied = ledger.is_applied(&plan.app_label, &plan.name).await?;
    let up_to_date = match direction {
        Direction::Forward => applied,
        Direction::Backward => !applied,
    };
    if up_to_date && !args.force {
        info!(
            app_label = %plan.app_label,
            migration = %plan.name,
            %direction,
            "nothing to do; pass --force to run anyway"
        );
        return Ok(ExitCode::SUCCESS);
    }

    let migration = plan.into_migration();
    let policy = migration
        .timeout
        .unwrap_or(config.timeout)
        .with_overrides(args.overrides())?;

    let registry = SessionRegistry::new(Arc::new(PgConnector), config.connections.clone());
    let runner = TimedMigrationRunner::new(registry);
    let mut run = MigrationRun::new(migration, direction);
    let outcome = runner.run(&mut run, &policy).await?;

    if let Err(err) = ledger.record_run(&run, &outcome).await {
        error!(%err, run_id = %run.id, "failed to record run in ledger");
    }

    print_outcome(&run, &outcome);
    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(run: &MigrationRun, outcome: &Outcome) {
    let label = format!("{}.{}", run.migration.app_label, run.migration.name);
    match outcome {
        Outcome::Completed => println!("{label} ({}): completed", run.direction),
        Outcome::TimedOut(report) => {
            println!(
                "{label} ({}): timed out at operation {} [{}]",
                run.direction, report.operation, run.records[report.operation].description
            );
            for action in &report.actions {
                println!("  {:?}: {:?}", action.kind, action.status);
            }
            if !report.session_usable_after {
                warn!("session was terminated; it is not usable after this run");
            }
            println!("  session usable after: {}", report.session_usable_after);
        }
        Outcome::Failed(report) => println!(
            "{label} ({}): failed at operation {} [{}]: {}",
            run.direction,
            report.operation,
            run.records[report.operation].description,
            report.cause
        ),
    }
}

async fn print_history(ledger: &LedgerRepo, app_label: &str, migration: &str) -> Result<()> {
    let entries = ledger.history(app_label, migration).await?;
    if entries.is_empty() {
        println!("no recorded runs for {app_label}.{migration}");
        return Ok(());
    }

    for entry in entries {
        let method = entry
            .cancellation_method
            .map_or_else(|| "-".to_owned(), |method| method.to_string());
        println!(
            "{}  {:<8}  {:<9}  method={}  {}",
            entry.finished_at.to_rfc3339(),
            entry.direction.as_str(),
            entry.outcome.as_str(),
            method,
            entry.detail.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

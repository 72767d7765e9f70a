//! Run ledger repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::migration::{Direction, MigrationRun};
use crate::models::outcome::{CancelAction, Outcome, OutcomeKind};
use crate::models::policy::CancellationMethod;
use crate::{AppError, Result};

use super::db::Database;

/// One finished run as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    /// Run identifier.
    pub id: String,
    /// Application the migration belongs to.
    pub app_label: String,
    /// Migration name.
    pub migration: String,
    /// Logical connection the run targeted.
    pub connection: String,
    /// Execution direction.
    pub direction: Direction,
    /// Outcome classification.
    pub outcome: OutcomeKind,
    /// Operation that stopped the run, if any.
    pub failed_operation: Option<i64>,
    /// Strategy that ran on timeout.
    pub cancellation_method: Option<CancellationMethod>,
    /// Actions attempted on timeout.
    pub cancel_actions: Vec<CancelAction>,
    /// Session usability after a timeout.
    pub session_usable_after: Option<bool>,
    /// Failure description for non-completed runs.
    pub detail: Option<String>,
    /// When the first operation started.
    pub started_at: DateTime<Utc>,
    /// When the outcome was reported.
    pub finished_at: DateTime<Utc>,
}

impl RunEntry {
    /// Build the ledger entry for a finished run.
    #[must_use]
    pub fn from_run(run: &MigrationRun, outcome: &Outcome) -> Self {
        let finished_at = run.finished_at.unwrap_or_else(Utc::now);
        let (cancellation_method, cancel_actions) = match outcome {
            Outcome::TimedOut(report) => (Some(report.method), report.actions.clone()),
            _ => (None, Vec::new()),
        };

        Self {
            id: run.id.clone(),
            app_label: run.migration.app_label.clone(),
            migration: run.migration.name.clone(),
            connection: run.migration.connection.clone(),
            direction: run.direction,
            outcome: outcome.kind(),
            failed_operation: outcome
                .stopped_at()
                .and_then(|index| i64::try_from(index).ok()),
            cancellation_method,
            cancel_actions,
            session_usable_after: outcome.session_usable_after(),
            detail: outcome.cause().map(ToString::to_string),
            started_at: run.started_at.unwrap_or(finished_at),
            finished_at,
        }
    }
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    app_label: String,
    migration: String,
    connection: String,
    direction: String,
    outcome: String,
    failed_operation: Option<i64>,
    cancellation_method: Option<String>,
    cancel_actions: String,
    session_usable_after: Option<i64>,
    detail: Option<String>,
    started_at: String,
    finished_at: String,
}

impl RunRow {
    /// Convert a database row into the domain model.
    fn into_entry(self) -> Result<RunEntry> {
        let started_at = DateTime::parse_from_rfc3339(&self.started_at)
            .map_err(|e| AppError::Db(format!("invalid started_at: {e}")))?
            .with_timezone(&Utc);
        let finished_at = DateTime::parse_from_rfc3339(&self.finished_at)
            .map_err(|e| AppError::Db(format!("invalid finished_at: {e}")))?
            .with_timezone(&Utc);
        let cancel_actions = serde_json::from_str(&self.cancel_actions)
            .map_err(|e| AppError::Db(format!("invalid cancel_actions: {e}")))?;
        let cancellation_method = self
            .cancellation_method
            .as_deref()
            .map(CancellationMethod::parse)
            .transpose()
            .map_err(|e| AppError::Db(e.to_string()))?;

        Ok(RunEntry {
            id: self.id,
            app_label: self.app_label,
            migration: self.migration,
            connection: self.connection,
            direction: Direction::parse(&self.direction)?,
            outcome: OutcomeKind::parse(&self.outcome)?,
            failed_operation: self.failed_operation,
            cancellation_method,
            cancel_actions,
            session_usable_after: self.session_usable_after.map(|v| v != 0),
            detail: self.detail,
            started_at,
            finished_at,
        })
    }
}

/// Repository wrapper around `SQLite` for run ledger records.
#[derive(Clone)]
pub struct LedgerRepo {
    db: Arc<Database>,
}

impl LedgerRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a finished run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn record(&self, entry: &RunEntry) -> Result<RunEntry> {
        let cancel_actions = serde_json::to_string(&entry.cancel_actions)
            .map_err(|e| AppError::Db(format!("serialize cancel_actions: {e}")))?;

        sqlx::query(
            "INSERT INTO migration_run (id, app_label, migration, connection, direction,
             outcome, failed_operation, cancellation_method, cancel_actions,
             session_usable_after, detail, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&entry.id)
        .bind(&entry.app_label)
        .bind(&entry.migration)
        .bind(&entry.connection)
        .bind(entry.direction.as_str())
        .bind(entry.outcome.as_str())
        .bind(entry.failed_operation)
        .bind(entry.cancellation_method.map(CancellationMethod::as_str))
        .bind(&cancel_actions)
        .bind(entry.session_usable_after.map(i64::from))
        .bind(&entry.detail)
        .bind(entry.started_at.to_rfc3339())
        .bind(entry.finished_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(entry.clone())
    }

    /// Record the outcome of `run`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn record_run(&self, run: &MigrationRun, outcome: &Outcome) -> Result<RunEntry> {
        self.record(&RunEntry::from_run(run, outcome)).await
    }

    /// All runs of one migration, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn history(&self, app_label: &str, migration: &str) -> Result<Vec<RunEntry>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM migration_run WHERE app_label = ?1 AND migration = ?2 \
             ORDER BY finished_at DESC, rowid DESC",
        )
        .bind(app_label)
        .bind(migration)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(RunRow::into_entry).collect()
    }

    /// Whether the latest completed run of a migration applied it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn is_applied(&self, app_label: &str, migration: &str) -> Result<bool> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT * FROM migration_run \
             WHERE app_label = ?1 AND migration = ?2 AND outcome = 'completed' \
             ORDER BY finished_at DESC, rowid DESC LIMIT 1",
        )
        .bind(app_label)
        .bind(migration)
        .fetch_optional(self.db.as_ref())
        .await?;

        match row {
            Some(row) => Ok(row.into_entry()?.direction == Direction::Forward),
            None => Ok(false),
        }
    }
}

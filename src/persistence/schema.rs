//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS`, so this is safe to re-run on every
//! startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the ledger table definitions.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS migration_run (
    id                   TEXT PRIMARY KEY NOT NULL,
    app_label            TEXT NOT NULL,
    migration            TEXT NOT NULL,
    connection           TEXT NOT NULL,
    direction            TEXT NOT NULL CHECK(direction IN ('forward','backward')),
    outcome              TEXT NOT NULL CHECK(outcome IN ('completed','timed_out','failed')),
    failed_operation     INTEGER,
    cancellation_method  TEXT CHECK(cancellation_method IN ('query','interrupt','both')),
    cancel_actions       TEXT NOT NULL DEFAULT '[]',
    session_usable_after INTEGER,
    detail               TEXT,
    started_at           TEXT NOT NULL,
    finished_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_migration_run_name
    ON migration_run (app_label, migration, finished_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}

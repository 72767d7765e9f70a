//! Migration plan files.
//!
//! A plan describes one migration in TOML so operators can run it from the
//! command line:
//!
//! ```toml
//! name = "0002_add_email_index"
//! app_label = "accounts"
//! connection = "default"
//!
//! [timeout]
//! deadline_seconds = 5.0
//! cancellation_method = "query"
//!
//! [[operations]]
//! kind = "sql"
//! forward = "CREATE INDEX CONCURRENTLY email_idx ON account (email)"
//! backward = "DROP INDEX CONCURRENTLY email_idx"
//!
//! [[operations]]
//! kind = "pause"
//! seconds = 1.5
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::models::migration::{Migration, DEFAULT_CONNECTION};
use crate::models::policy::{bounded_seconds, clamp_seconds, TimeoutPolicy};
use crate::operations::{RunCode, RunSql};
use crate::{AppError, Result};

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_owned()
}

/// One operation entry of a plan.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlannedOperation {
    /// Raw SQL with optional reverse SQL.
    Sql {
        /// Statement applied going forward.
        forward: String,
        /// Statement applied when undoing; absent means irreversible.
        #[serde(default)]
        backward: Option<String>,
    },
    /// Computation that waits, in either direction.
    Pause {
        /// Wait length in seconds.
        seconds: f64,
    },
}

/// A migration described in TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MigrationPlan {
    /// Migration name.
    pub name: String,
    /// Application the migration belongs to.
    pub app_label: String,
    /// Logical connection to run on.
    #[serde(default = "default_connection")]
    pub connection: String,
    /// Policy overriding the global one for this migration.
    #[serde(default)]
    pub timeout: Option<TimeoutPolicy>,
    /// Operations in forward order.
    pub operations: Vec<PlannedOperation>,
}

impl MigrationPlan {
    /// Load and validate a plan from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, is not valid
    /// TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read plan: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a plan from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let plan: Self = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.app_label.trim().is_empty() {
            return Err(AppError::Config(
                "plan name and app_label must not be empty".into(),
            ));
        }
        if self.operations.is_empty() {
            return Err(AppError::Config(format!(
                "plan '{}' has no operations",
                self.name
            )));
        }
        for (index, operation) in self.operations.iter().enumerate() {
            match operation {
                PlannedOperation::Sql { forward, .. } if forward.trim().is_empty() => {
                    return Err(AppError::Config(format!(
                        "operation {index}: forward sql is empty"
                    )));
                }
                PlannedOperation::Pause { seconds } => {
                    bounded_seconds(&format!("operation {index}: pause seconds"), *seconds)?;
                }
                PlannedOperation::Sql { .. } => {}
            }
        }
        if let Some(policy) = &self.timeout {
            policy.validate()?;
        }
        Ok(())
    }

    /// Build the runnable migration.
    #[must_use]
    pub fn into_migration(self) -> Migration {
        let mut migration = Migration::new(self.app_label, self.name).on_connection(self.connection);
        migration.timeout = self.timeout;
        for operation in self.operations {
            migration = match operation {
                PlannedOperation::Sql { forward, backward } => {
                    let sql = RunSql::new(forward);
                    migration.with_operation(match backward {
                        Some(backward) => sql.with_reverse(backward),
                        None => sql,
                    })
                }
                PlannedOperation::Pause { seconds } => {
                    migration.with_operation(RunCode::pause(clamp_seconds(seconds)))
                }
            };
        }
        migration
    }
}

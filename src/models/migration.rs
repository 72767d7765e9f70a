//! Migration description and the per-run execution record.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::TimeoutPolicy;
use crate::operations::MigrationOperation;
use crate::{AppError, Result};

/// Connection name used when a migration does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Order in which a migration's operations are executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Apply operations in declared order.
    Forward,
    /// Undo operations in reverse declared order.
    Backward,
}

impl Direction {
    /// Stable name used in logs and the run ledger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }

    /// Parse the stable name produced by [`as_str`](Self::as_str).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for an unknown direction.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(AppError::Db(format!("invalid direction: {other}"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of operations targeting one logical connection.
#[derive(Clone)]
pub struct Migration {
    /// Migration name, unique within its app label.
    pub name: String,
    /// Application the migration belongs to.
    pub app_label: String,
    /// Logical connection the database operations run on.
    pub connection: String,
    /// Operations in declared (forward) order.
    pub operations: Vec<Arc<dyn MigrationOperation>>,
    /// Policy attached to this migration; the runner falls back to the
    /// caller's policy when absent.
    pub timeout: Option<TimeoutPolicy>,
}

impl Migration {
    /// Empty migration on the default connection.
    #[must_use]
    pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_label: app_label.into(),
            connection: DEFAULT_CONNECTION.to_owned(),
            operations: Vec::new(),
            timeout: None,
        }
    }

    /// Target a different logical connection.
    #[must_use]
    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    /// Append an operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl MigrationOperation + 'static) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    /// Attach a timeout policy to this migration.
    #[must_use]
    pub fn with_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("app_label", &self.app_label)
            .field("connection", &self.connection)
            .field(
                "operations",
                &self
                    .operations
                    .iter()
                    .map(|op| op.describe())
                    .collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Per-operation lifecycle within one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Not started.
    Idle,
    /// Executing under an armed deadline.
    Running,
    /// Finished successfully.
    Completed,
    /// Interrupted after its deadline elapsed.
    TimedOut,
    /// Failed for its own reasons.
    Failed,
}

impl OperationState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

/// Execution record of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// Index in declared order.
    pub index: usize,
    /// Human-readable operation summary.
    pub description: String,
    /// Current lifecycle state.
    pub state: OperationState,
    /// Wall time spent executing, once the operation has returned.
    pub elapsed: Option<Duration>,
}

/// One invocation of a migration in a given direction.
#[derive(Debug)]
pub struct MigrationRun {
    /// Unique run identifier.
    pub id: String,
    /// Migration being executed.
    pub migration: Migration,
    /// Execution direction.
    pub direction: Direction,
    /// Per-operation records, indexed by declared order.
    pub records: Vec<OperationRecord>,
    /// Set when the runner starts the first operation.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the runner reports the outcome.
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    /// Prepare a run with every operation idle.
    #[must_use]
    pub fn new(migration: Migration, direction: Direction) -> Self {
        let records = migration
            .operations
            .iter()
            .enumerate()
            .map(|(index, op)| OperationRecord {
                index,
                description: op.describe(),
                state: OperationState::Idle,
                elapsed: None,
            })
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            migration,
            direction,
            records,
            started_at: None,
            finished_at: None,
        }
    }

    /// Operation indices in execution order.
    #[must_use]
    pub fn schedule(&self) -> Vec<usize> {
        let count = self.migration.operations.len();
        match self.direction {
            Direction::Forward => (0..count).collect(),
            Direction::Backward => (0..count).rev().collect(),
        }
    }

    /// State of the operation at `index`, if it exists.
    #[must_use]
    pub fn state(&self, index: usize) -> Option<OperationState> {
        self.records.get(index).map(|record| record.state)
    }
}

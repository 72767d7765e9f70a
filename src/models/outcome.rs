//! Run outcomes and the cancellation actions recorded with them.

use serde::{Deserialize, Serialize};

use super::policy::CancellationMethod;
use crate::{AppError, Result};

/// Mechanism a cancellation strategy tried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelKind {
    /// Statement-level cancel through an administrative connection.
    QueryCancel,
    /// Session termination through an administrative connection.
    Terminate,
    /// Interrupt delivered to the executing computation.
    ThreadInterrupt,
}

/// What became of one cancellation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The request reached its target.
    Delivered,
    /// The database accepted the request but had nothing to act on.
    NotDelivered,
    /// Target session was already dead; nothing was attempted.
    SkippedDeadSession,
    /// The operation had no database session to act on.
    NoSession,
    /// The attempt itself failed (e.g. the admin connection was refused).
    Failed(String),
}

/// One attempted cancellation action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelAction {
    /// Mechanism used.
    pub kind: CancelKind,
    /// Result of the attempt.
    pub status: ActionStatus,
}

impl CancelAction {
    /// Construct an action record.
    #[must_use]
    pub fn new(kind: CancelKind, status: ActionStatus) -> Self {
        Self { kind, status }
    }

    /// Whether the action reached its target.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.status == ActionStatus::Delivered
    }
}

/// Details of an operation interrupted by its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutReport {
    /// Index of the interrupted operation in the migration's declared order.
    pub operation: usize,
    /// Strategy that ran when the deadline elapsed.
    pub method: CancellationMethod,
    /// Every action the strategy attempted, in order.
    pub actions: Vec<CancelAction>,
    /// Whether the owning session may still be used for statements.
    pub session_usable_after: bool,
    /// Failure the operation surfaced once interrupted.
    pub cause: AppError,
}

/// Details of an operation that failed for its own reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Index of the failed operation in the migration's declared order.
    pub operation: usize,
    /// Failure surfaced by the operation.
    pub cause: AppError,
}

/// Result of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every operation completed.
    Completed,
    /// An operation exceeded its deadline and was interrupted.
    TimedOut(TimeoutReport),
    /// An operation failed; the cause is propagated verbatim.
    Failed(FailureReport),
}

impl Outcome {
    /// Whether the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether the run was stopped by its deadline.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Coarse classification of this outcome.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Completed => OutcomeKind::Completed,
            Self::TimedOut(_) => OutcomeKind::TimedOut,
            Self::Failed(_) => OutcomeKind::Failed,
        }
    }

    /// Session usability after a timeout; `None` for other outcomes.
    #[must_use]
    pub fn session_usable_after(&self) -> Option<bool> {
        match self {
            Self::TimedOut(report) => Some(report.session_usable_after),
            _ => None,
        }
    }

    /// Failure carried by a non-completed outcome.
    #[must_use]
    pub fn cause(&self) -> Option<&AppError> {
        match self {
            Self::Completed => None,
            Self::TimedOut(report) => Some(&report.cause),
            Self::Failed(report) => Some(&report.cause),
        }
    }

    /// Index of the operation that stopped the run.
    #[must_use]
    pub fn stopped_at(&self) -> Option<usize> {
        match self {
            Self::Completed => None,
            Self::TimedOut(report) => Some(report.operation),
            Self::Failed(report) => Some(report.operation),
        }
    }
}

/// Outcome classification without its payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// See [`Outcome::Completed`].
    Completed,
    /// See [`Outcome::TimedOut`].
    TimedOut,
    /// See [`Outcome::Failed`].
    Failed,
}

impl OutcomeKind {
    /// Stable name used in the run ledger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable name produced by [`as_str`](Self::as_str).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for an unknown name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(Self::Completed),
            "timed_out" => Ok(Self::TimedOut),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::Db(format!("invalid outcome: {other}"))),
        }
    }
}

//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Postgres SQLSTATE raised on a statement stopped by `pg_cancel_backend`.
const QUERY_CANCELED: &str = "57014";

/// Postgres SQLSTATEs raised on a backend shut down underneath its client.
const SESSION_SHUTDOWN: [&str; 3] = ["57P01", "57P02", "57P03"];

/// Error enumeration covering every failure mode of a timed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A statement failed on the database for its own reasons.
    Db(String),
    /// The running statement was stopped by a query-level cancel request.
    StatementCancelled(String),
    /// The session was terminated or its transport dropped; it is unusable.
    ConnectionLost(String),
    /// A computation observed its interrupt handle.
    Interrupted(String),
    /// A computation failed on its own.
    Operation(String),
    /// Undo was requested for an operation that has no reverse.
    Irreversible(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this failure is the shape a cancellation strategy produces.
    ///
    /// Only these failures are reclassified as a timeout when the watchdog
    /// fired during the operation.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            Self::StatementCancelled(_) | Self::ConnectionLost(_) | Self::Interrupted(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::StatementCancelled(msg) => write!(f, "statement cancelled: {msg}"),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
            Self::Operation(msg) => write!(f, "operation: {msg}"),
            Self::Irreversible(msg) => write!(f, "irreversible: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(QUERY_CANCELED) => Self::StatementCancelled(db.message().to_owned()),
                Some(code) if SESSION_SHUTDOWN.contains(&code) => {
                    Self::ConnectionLost(db.message().to_owned())
                }
                _ => Self::Db(err.to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::ConnectionLost(err.to_string()),
            _ => Self::Db(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

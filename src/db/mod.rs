//! Database substrate abstraction.
//!
//! The timing core never speaks a wire protocol itself. A [`Connector`]
//! opens the long-lived [`DatabaseSession`] a migration runs on, and a
//! separate, short-lived [`AdminConnection`] through which a cancellation
//! strategy reaches that session from another task.

pub mod postgres;

use std::future::Future;
use std::pin::Pin;

use crate::config::ConnectionSettings;
use crate::Result;

/// Boxed future returned by the object-safe database traits.
pub type DbFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Server-side identifier of a session, usable to target cancellation.
pub type SessionId = i64;

/// One live connection that executes migration statements.
pub trait DatabaseSession: Send {
    /// Identifier the server knows this session by.
    fn session_id(&self) -> SessionId;

    /// Execute one unit of work and wait for the server's reply.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StatementCancelled` when a query-level cancel stopped
    /// the statement, `AppError::ConnectionLost` when the session went away,
    /// and `AppError::Db` for any other statement failure.
    fn execute<'a>(&'a mut self, sql: &'a str) -> DbFuture<'a, ()>;
}

/// Short-lived side channel used to cancel or terminate another session.
pub trait AdminConnection: Send {
    /// Ask the server to cancel the statement running on `session_id`.
    ///
    /// Returns `false` when the server had no such session to signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the request itself fails.
    fn cancel_statement(&mut self, session_id: SessionId) -> DbFuture<'_, bool>;

    /// Ask the server to terminate `session_id` outright.
    ///
    /// Returns `false` when the server had no such session to terminate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the request itself fails.
    fn terminate_session(&mut self, session_id: SessionId) -> DbFuture<'_, bool>;

    /// Close the administrative connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` if the close handshake fails.
    fn close(self: Box<Self>) -> DbFuture<'static, ()>;
}

/// Opens sessions and administrative connections for a configured database.
pub trait Connector: Send + Sync {
    /// Open a session for migration work.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` or `AppError::Db` if the server
    /// cannot be reached or refuses the credentials.
    fn connect<'a>(&'a self, settings: &'a ConnectionSettings)
        -> DbFuture<'a, Box<dyn DatabaseSession>>;

    /// Open an administrative connection to the same database.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` or `AppError::Db` if the server
    /// cannot be reached or refuses the credentials.
    fn open_admin<'a>(
        &'a self,
        settings: &'a ConnectionSettings,
    ) -> DbFuture<'a, Box<dyn AdminConnection>>;
}

//! Migration operations consumed by the runner.
//!
//! An operation is either database work executed on the migration's
//! session ([`RunSql`]) or an arbitrary in-process computation
//! ([`RunCode`]). The runner only needs to know which substrate an
//! operation runs on to pick the interruption mechanism that can reach it.

pub mod code;
pub mod sql;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::orchestrator::interrupt::InterruptHandle;
use crate::orchestrator::session_registry::SessionHandle;
use crate::{AppError, Result};

pub use code::RunCode;
pub use sql::RunSql;

/// Where an operation spends its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substrate {
    /// Blocked on the database's reply; only a query-level cancel or a
    /// session termination can stop it.
    Database,
    /// Local computation; stopped by the interrupt handle.
    Computation,
}

/// Everything an operation may use while executing.
#[derive(Debug, Clone)]
pub struct OperationContext {
    session: Option<Arc<SessionHandle>>,
    interrupt: InterruptHandle,
}

impl OperationContext {
    /// Context for one execution window.
    #[must_use]
    pub fn new(session: Option<Arc<SessionHandle>>, interrupt: InterruptHandle) -> Self {
        Self { session, interrupt }
    }

    /// Session of the migration's connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the operation was started without
    /// a session.
    pub fn session(&self) -> Result<Arc<SessionHandle>> {
        self.session
            .clone()
            .ok_or_else(|| AppError::NotFound("operation requires a database session".into()))
    }

    /// Interrupt signal for this execution window.
    #[must_use]
    pub fn interrupt(&self) -> &InterruptHandle {
        &self.interrupt
    }
}

/// One step of a migration.
pub trait MigrationOperation: Send + Sync {
    /// Short human-readable summary used in logs and records.
    fn describe(&self) -> String;

    /// Substrate the operation runs on.
    fn substrate(&self) -> Substrate;

    /// Whether [`undo`](Self::undo) is supported.
    fn reversible(&self) -> bool;

    /// Apply the operation.
    ///
    /// # Errors
    ///
    /// Returns whatever failure the underlying work surfaces.
    fn apply(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>>;

    /// Undo the operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Irreversible` when no reverse exists, otherwise
    /// whatever failure the underlying work surfaces.
    fn undo(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>>;
}

//! Raw SQL operation.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{MigrationOperation, OperationContext, Substrate};
use crate::{AppError, Result};

/// Longest statement prefix shown in descriptions.
const DESCRIBE_LIMIT: usize = 60;

/// Execute raw SQL on the migration's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSql {
    forward: String,
    backward: Option<String>,
}

impl RunSql {
    /// Irreversible SQL operation.
    #[must_use]
    pub fn new(forward: impl Into<String>) -> Self {
        Self {
            forward: forward.into(),
            backward: None,
        }
    }

    /// Attach the SQL that undoes this operation.
    #[must_use]
    pub fn with_reverse(mut self, backward: impl Into<String>) -> Self {
        self.backward = Some(backward.into());
        self
    }

    /// Make undo succeed without executing anything.
    #[must_use]
    pub fn with_noop_reverse(self) -> Self {
        self.with_reverse(String::new())
    }

    /// Forward statement text.
    #[must_use]
    pub fn forward(&self) -> &str {
        &self.forward
    }

    /// Reverse statement text, if any.
    #[must_use]
    pub fn backward(&self) -> Option<&str> {
        self.backward.as_deref()
    }
}

fn execute(ctx: OperationContext, sql: &str) -> BoxFuture<'_, Result<()>> {
    async move {
        if sql.trim().is_empty() {
            return Ok(());
        }
        let session = ctx.session()?;
        session.execute(sql).await
    }
    .boxed()
}

impl MigrationOperation for RunSql {
    fn describe(&self) -> String {
        let statement = self.forward.trim();
        match statement.char_indices().nth(DESCRIBE_LIMIT) {
            Some((cut, _)) => format!("sql: {}...", &statement[..cut]),
            None => format!("sql: {statement}"),
        }
    }

    fn substrate(&self) -> Substrate {
        Substrate::Database
    }

    fn reversible(&self) -> bool {
        self.backward.is_some()
    }

    fn apply(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>> {
        execute(ctx, &self.forward)
    }

    fn undo(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>> {
        match &self.backward {
            Some(sql) => execute(ctx, sql),
            None => {
                let description = self.describe();
                async move { Err(AppError::Irreversible(description)) }.boxed()
            }
        }
    }
}

//! Arbitrary in-process computation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{MigrationOperation, OperationContext, Substrate};
use crate::orchestrator::interrupt::InterruptHandle;
use crate::{AppError, Result};

type CodeFn = Arc<dyn Fn(InterruptHandle) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Run a computation as a migration step.
///
/// Async computations are interrupted at their next `.await` once the
/// deadline fires. Computations built with [`RunCode::blocking`] run on the
/// blocking pool; the runner stops waiting for them as soon as the interrupt
/// is delivered, but the closure only stops working once it polls
/// [`InterruptHandle::check`].
#[derive(Clone)]
pub struct RunCode {
    label: String,
    forward: CodeFn,
    backward: Option<CodeFn>,
}

fn boxed_async<F, Fut>(f: F) -> CodeFn
where
    F: Fn(InterruptHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |interrupt: InterruptHandle| f(interrupt).boxed())
}

fn boxed_blocking<F>(f: F) -> CodeFn
where
    F: Fn(&InterruptHandle) -> Result<()> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |interrupt: InterruptHandle| {
        let f = Arc::clone(&f);
        async move {
            tokio::task::spawn_blocking(move || f(&interrupt))
                .await
                .map_err(|err| AppError::Operation(format!("blocking computation failed: {err}")))?
        }
        .boxed()
    })
}

fn noop() -> CodeFn {
    boxed_async(|_| async { Ok(()) })
}

impl RunCode {
    /// Irreversible async computation.
    #[must_use]
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(InterruptHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            forward: boxed_async(f),
            backward: None,
        }
    }

    /// Irreversible blocking computation, run on the blocking pool.
    #[must_use]
    pub fn blocking<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&InterruptHandle) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            forward: boxed_blocking(f),
            backward: None,
        }
    }

    /// Computation that just waits, in both directions.
    #[must_use]
    pub fn pause(duration: Duration) -> Self {
        let wait = boxed_async(move |_| async move {
            tokio::time::sleep(duration).await;
            Ok(())
        });
        Self {
            label: format!("pause {:.3}s", duration.as_secs_f64()),
            forward: Arc::clone(&wait),
            backward: Some(wait),
        }
    }

    /// Attach an async computation that undoes this one.
    #[must_use]
    pub fn with_reverse<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InterruptHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.backward = Some(boxed_async(f));
        self
    }

    /// Make undo succeed without doing anything.
    #[must_use]
    pub fn with_noop_reverse(mut self) -> Self {
        self.backward = Some(noop());
        self
    }
}

impl fmt::Debug for RunCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCode")
            .field("label", &self.label)
            .field("reversible", &self.backward.is_some())
            .finish_non_exhaustive()
    }
}

impl MigrationOperation for RunCode {
    fn describe(&self) -> String {
        format!("code: {}", self.label)
    }

    fn substrate(&self) -> Substrate {
        Substrate::Computation
    }

    fn reversible(&self) -> bool {
        self.backward.is_some()
    }

    fn apply(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>> {
        (self.forward)(ctx.interrupt().clone())
    }

    fn undo(&self, ctx: OperationContext) -> BoxFuture<'_, Result<()>> {
        match &self.backward {
            Some(backward) => backward(ctx.interrupt().clone()),
            None => {
                let description = self.describe();
                async move { Err(AppError::Irreversible(description)) }.boxed()
            }
        }
    }
}

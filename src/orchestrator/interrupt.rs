//! Interrupt delivery into a running computation.
//!
//! Rust cannot unwind another thread's stack, so an interrupt is a
//! cancellation token handed to the computation. The runner races async
//! computations against it, which makes every `.await` an interruption
//! point; blocking computations must poll [`InterruptHandle::check`].

use tokio_util::sync::CancellationToken;

use crate::{AppError, Result};

/// Interrupt signal for one operation's execution window.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: CancellationToken,
}

impl InterruptHandle {
    /// Fresh, undelivered interrupt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the interrupt. Idempotent.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    /// Whether the interrupt has been delivered.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`AppError::Interrupted`] once the interrupt is delivered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Interrupted` after [`interrupt`](Self::interrupt).
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Self::interrupted_error())
        } else {
            Ok(())
        }
    }

    /// Resolve once the interrupt is delivered.
    pub async fn interrupted(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn interrupted_error() -> AppError {
        AppError::Interrupted("operation interrupted after its deadline elapsed".into())
    }
}

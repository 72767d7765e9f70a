//! Per-operation deadline watchdog.
//!
//! [`Watchdog::arm`] spawns one countdown task and returns a
//! [`DeadlineHandle`]. If the countdown elapses before the handle is
//! disarmed, the expiry callback runs exactly once on that task, never on
//! the task doing the timed work. Disarm and expiry resolve through a
//! single compare-and-swap on the handle state, so whichever comes second
//! is a no-op and neither side ever waits on the other.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

const ARMED: u8 = 0;
const DISARMED: u8 = 1;
const FIRED: u8 = 2;

/// Builder for a single deadline.
///
/// Call [`arm`](Self::arm) to start the countdown.
#[derive(Debug, Clone)]
pub struct Watchdog {
    label: String,
    duration: Option<Duration>,
}

impl Watchdog {
    /// Construct a watchdog; `duration = None` never fires.
    #[must_use]
    pub fn new(label: impl Into<String>, duration: Option<Duration>) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }

    /// Start the countdown and return the handle controlling it.
    ///
    /// Without a duration nothing is spawned and the returned handle is an
    /// inert sentinel.
    #[must_use]
    pub fn arm<F, Fut, R>(self, on_expire: F) -> DeadlineHandle<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let armed_at = Instant::now();
        let cancel = CancellationToken::new();

        let Some(duration) = self.duration else {
            debug!(label = %self.label, "no deadline configured; watchdog left unarmed");
            return DeadlineHandle {
                state: Arc::new(AtomicU8::new(DISARMED)),
                cancel,
                armed_at,
                expires_at: None,
                join_handle: None,
            };
        };

        let state = Arc::new(AtomicU8::new(ARMED));
        let span = info_span!("watchdog", label = %self.label);
        let join_handle = tokio::spawn(
            Self::run(
                self.label,
                duration,
                Arc::clone(&state),
                cancel.clone(),
                on_expire,
            )
            .instrument(span),
        );

        DeadlineHandle {
            state,
            cancel,
            armed_at,
            expires_at: Some(armed_at + duration),
            join_handle: Some(join_handle),
        }
    }

    /// Countdown task body.
    async fn run<F, Fut, R>(
        label: String,
        duration: Duration,
        state: Arc<AtomicU8>,
        cancel: CancellationToken,
        on_expire: F,
    ) -> Option<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(label, "watchdog disarmed");
                None
            }
            () = tokio::time::sleep(duration) => {
                if state
                    .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(label, "deadline elapsed after disarm; ignoring");
                    return None;
                }
                let deadline_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                warn!(label, deadline_ms, "deadline exceeded; cancelling operation");
                // The token is no longer observed, so a late disarm cannot
                // abort the callback half-way.
                Some(on_expire().await)
            }
        }
    }
}

/// Handle returned from [`Watchdog::arm`] for one timed operation.
///
/// Dropping the handle disarms it, so a countdown never outlives the
/// operation it guards even when that operation unwinds.
pub struct DeadlineHandle<R> {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    armed_at: Instant,
    expires_at: Option<Instant>,
    join_handle: Option<JoinHandle<Option<R>>>,
}

impl<R> Drop for DeadlineHandle<R> {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl<R> DeadlineHandle<R> {
    /// Stop the countdown.
    ///
    /// Returns `true` if this call prevented expiry, `false` if the deadline
    /// already fired, was already disarmed, or was never armed.
    pub fn disarm(&self) -> bool {
        let won = self
            .state
            .compare_exchange(ARMED, DISARMED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.cancel.cancel();
        won
    }

    /// Whether the countdown is still running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ARMED
    }

    /// Whether the expiry callback has been (or is being) run.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// When the countdown started.
    #[must_use]
    pub fn armed_at(&self) -> Instant {
        self.armed_at
    }

    /// When the countdown elapses; `None` for an unarmed sentinel.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Disarm, then wait for the countdown task to finish.
    ///
    /// Returns the callback's result if the deadline fired. Waiting here
    /// guarantees the cancellation strategy has finished acting before the
    /// caller moves on to its next operation.
    pub async fn settle(mut self) -> Option<R> {
        self.disarm();
        let handle = self.join_handle.take()?;
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "watchdog task did not complete");
                None
            }
        }
    }
}

impl<R> std::fmt::Debug for DeadlineHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineHandle")
            .field("armed", &self.is_armed())
            .field("fired", &self.has_fired())
            .field("armed_at", &self.armed_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

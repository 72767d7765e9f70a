//! Timed migration runner.
//!
//! Executes a migration's operations one at a time, forward or backward,
//! with a fresh deadline armed around each one. The first operation that
//! does not complete stops the run and becomes its outcome; later
//! operations are never attempted.
//!
//! Classification relies on a single fact, whether the watchdog fired:
//!
//! | operation result                 | watchdog fired | outcome     |
//! |----------------------------------|----------------|-------------|
//! | success                          | either         | `Completed` |
//! | interruption-shaped failure      | yes            | `TimedOut`  |
//! | any other failure                | either         | `Failed`    |

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cancellation::{self, CancelTarget};
use super::interrupt::InterruptHandle;
use super::session_registry::{SessionHandle, SessionRegistry};
use super::watchdog::Watchdog;
use crate::models::migration::{Direction, MigrationRun, OperationState};
use crate::models::outcome::{CancelAction, FailureReport, Outcome, TimeoutReport};
use crate::models::policy::{CancellationMethod, TimeoutPolicy};
use crate::operations::{MigrationOperation, OperationContext, Substrate};
use crate::Result;

/// Runs migrations under a [`TimeoutPolicy`].
#[derive(Clone)]
pub struct TimedMigrationRunner {
    registry: SessionRegistry,
}

impl TimedMigrationRunner {
    /// Create a runner resolving sessions through `registry`.
    #[must_use]
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Registry sessions are resolved from.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Execute every scheduled operation of `run` under `policy`.
    ///
    /// The policy is copied up front and stays fixed for the whole run.
    /// Per-operation states in `run.records` are updated as the run
    /// progresses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the policy is invalid. Operation
    /// failures are reported through the returned [`Outcome`], never as `Err`.
    pub async fn run(&self, run: &mut MigrationRun, policy: &TimeoutPolicy) -> Result<Outcome> {
        policy.validate()?;
        let policy = *policy;

        let span = info_span!(
            "migration_run",
            run_id = %run.id,
            app_label = %run.migration.app_label,
            migration = %run.migration.name,
            direction = %run.direction,
        );

        async move {
            run.started_at = Some(Utc::now());
            info!(
                operations = run.records.len(),
                deadline_seconds = ?policy.deadline_seconds,
                method = %policy.cancellation_method,
                safe_interrupt = policy.safe_interrupt,
                "migration run started"
            );

            let mut outcome = Outcome::Completed;
            for index in run.schedule() {
                let operation = Arc::clone(&run.migration.operations[index]);
                run.records[index].state = OperationState::Running;

                let started = Instant::now();
                let result = self
                    .run_operation(index, operation.as_ref(), run, &policy)
                    .await;
                let record = &mut run.records[index];
                record.elapsed = Some(started.elapsed());
                record.state = match &result {
                    Outcome::Completed => OperationState::Completed,
                    Outcome::TimedOut(_) => OperationState::TimedOut,
                    Outcome::Failed(_) => OperationState::Failed,
                };

                if !result.is_completed() {
                    outcome = result;
                    break;
                }
            }

            run.finished_at = Some(Utc::now());
            match &outcome {
                Outcome::Completed => info!("migration run completed"),
                Outcome::TimedOut(report) => warn!(
                    operation = report.operation,
                    session_usable_after = report.session_usable_after,
                    cause = %report.cause,
                    "migration run timed out"
                ),
                Outcome::Failed(report) => warn!(
                    operation = report.operation,
                    cause = %report.cause,
                    "migration run failed"
                ),
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Arm, invoke, settle, classify one operation.
    async fn run_operation(
        &self,
        index: usize,
        operation: &dyn MigrationOperation,
        run: &MigrationRun,
        policy: &TimeoutPolicy,
    ) -> Outcome {
        let description = operation.describe();
        let span = info_span!("operation", index, description = %description);

        async move {
            let session = match operation.substrate() {
                Substrate::Database => match self.registry.resolve(&run.migration.connection).await {
                    Ok(handle) => Some(handle),
                    Err(cause) => {
                        return Outcome::Failed(FailureReport {
                            operation: index,
                            cause,
                        })
                    }
                },
                Substrate::Computation => None,
            };

            let method = policy.cancellation_method;
            // A computation step still holds the migration's session open, so
            // query-level cancellation acts on it when one exists.
            let cancel_session = match (&session, method) {
                (Some(handle), _) => Some(Arc::clone(handle)),
                (None, CancellationMethod::Interrupt) => None,
                (None, _) => self.registry.cached(&run.migration.connection).await,
            };

            let interrupt = InterruptHandle::new();
            let target = CancelTarget {
                session: cancel_session.clone(),
                interrupt: interrupt.clone(),
                safe_interrupt: policy.safe_interrupt,
                registry: self.registry.clone(),
            };
            let label = format!("{}.{}#{index}", run.migration.app_label, run.migration.name);
            let deadline = Watchdog::new(label, policy.deadline())
                .arm(move || async move { cancellation::cancel(method, &target).await });

            debug!("operation started");
            let ctx = OperationContext::new(session.clone(), interrupt.clone());
            let result = invoke(operation, ctx, run.direction, &interrupt).await;

            // Disarm on every path; a fired deadline is awaited so the
            // strategy has finished acting before classification.
            let actions = deadline.settle().await;

            classify(index, result, actions, policy, cancel_session.as_deref())
        }
        .instrument(span)
        .await
    }
}

/// Run the operation in `direction`; computations race the interrupt.
async fn invoke(
    operation: &dyn MigrationOperation,
    ctx: OperationContext,
    direction: Direction,
    interrupt: &InterruptHandle,
) -> Result<()> {
    let work = match direction {
        Direction::Forward => operation.apply(ctx),
        Direction::Backward => operation.undo(ctx),
    };

    match operation.substrate() {
        // A database wait cannot observe the interrupt.
        Substrate::Database => work.await,
        Substrate::Computation => {
            tokio::select! {
                biased;
                result = work => result,
                () = interrupt.interrupted() => Err(InterruptHandle::interrupted_error()),
            }
        }
    }
}

fn classify(
    index: usize,
    result: Result<()>,
    actions: Option<Vec<CancelAction>>,
    policy: &TimeoutPolicy,
    session: Option<&SessionHandle>,
) -> Outcome {
    match (result, actions) {
        (Ok(()), None) => {
            debug!("operation completed");
            Outcome::Completed
        }
        (Ok(()), Some(actions)) => {
            // Completion raced the deadline and won.
            warn!(?actions, "operation completed although its deadline fired");
            Outcome::Completed
        }
        (Err(cause), Some(actions)) if cause.is_interruption() => {
            let session_usable_after = session.map_or(true, SessionHandle::is_alive);
            Outcome::TimedOut(TimeoutReport {
                operation: index,
                method: policy.cancellation_method,
                actions,
                session_usable_after,
                cause,
            })
        }
        (Err(cause), _) => Outcome::Failed(FailureReport {
            operation: index,
            cause,
        }),
    }
}

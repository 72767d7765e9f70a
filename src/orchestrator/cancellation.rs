//! Cancellation strategies run when a deadline expires.
//!
//! Each [`CancellationMethod`] maps onto a fixed set of actions:
//!
//! * `Query` cancels the statement running on the target session through a
//!   short-lived administrative connection, or terminates the session when
//!   the policy does not ask for a safe interrupt.
//! * `Interrupt` delivers the operation's [`InterruptHandle`]. A database
//!   wait never observes it.
//! * `Both` runs `Query` and then `Interrupt`, whatever the first returned.
//!
//! Every attempt is best-effort: failures are recorded as actions and
//! logged, never raised.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::interrupt::InterruptHandle;
use super::session_registry::{SessionHandle, SessionRegistry};
use crate::models::outcome::{ActionStatus, CancelAction, CancelKind};
use crate::models::policy::CancellationMethod;

/// Upper bound on opening the administrative connection.
pub const ADMIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a strategy acts on for one timed operation.
#[derive(Clone)]
pub struct CancelTarget {
    /// Session the operation runs on; `None` for pure computation.
    pub session: Option<Arc<SessionHandle>>,
    /// Interrupt signal of the operation's execution window.
    pub interrupt: InterruptHandle,
    /// Cancel only the running statement instead of terminating the session.
    pub safe_interrupt: bool,
    /// Registry the session was resolved from.
    pub registry: SessionRegistry,
}

/// Run `method` against `target` and return every attempted action.
pub async fn cancel(method: CancellationMethod, target: &CancelTarget) -> Vec<CancelAction> {
    match method {
        CancellationMethod::Query => vec![query_cancel(target).await],
        CancellationMethod::Interrupt => vec![thread_interrupt(target)],
        CancellationMethod::Both => {
            let first = query_cancel(target).await;
            vec![first, thread_interrupt(target)]
        }
    }
}

/// Statement cancel, or session termination for an unsafe interrupt.
async fn query_cancel(target: &CancelTarget) -> CancelAction {
    let kind = if target.safe_interrupt {
        CancelKind::QueryCancel
    } else {
        CancelKind::Terminate
    };

    let Some(session) = target.session.as_ref() else {
        debug!(?kind, "no database session to cancel");
        return CancelAction::new(kind, ActionStatus::NoSession);
    };

    if !session.is_alive() {
        info!(
            connection = session.name(),
            session_id = session.session_id(),
            "session already dead; cancellation is a no-op"
        );
        return CancelAction::new(kind, ActionStatus::SkippedDeadSession);
    }

    let status = match deliver(kind, session, &target.registry).await {
        Ok(true) => ActionStatus::Delivered,
        Ok(false) => ActionStatus::NotDelivered,
        Err(reason) => ActionStatus::Failed(reason),
    };

    if kind == CancelKind::Terminate && status == ActionStatus::NotDelivered {
        // The server no longer knows the backend: it is gone either way.
        target.registry.mark_dead(session);
    }

    CancelAction::new(kind, status)
}

/// Open the admin connection, send one request, and always close it again.
async fn deliver(
    kind: CancelKind,
    session: &SessionHandle,
    registry: &SessionRegistry,
) -> Result<bool, String> {
    let session_id = session.session_id();
    let connect = registry.connector().open_admin(session.settings());
    let mut admin = match tokio::time::timeout(ADMIN_CONNECT_TIMEOUT, connect).await {
        Ok(Ok(admin)) => admin,
        Ok(Err(err)) => {
            warn!(session_id, %err, "failed to open administrative connection");
            return Err(err.to_string());
        }
        Err(_) => {
            warn!(session_id, "timed out opening administrative connection");
            return Err("administrative connection timed out".into());
        }
    };

    let result = if kind == CancelKind::Terminate {
        admin.terminate_session(session_id).await
    } else {
        admin.cancel_statement(session_id).await
    };

    if let Err(err) = admin.close().await {
        debug!(session_id, %err, "administrative connection did not close cleanly");
    }

    match result {
        Ok(signalled) => {
            if kind == CancelKind::Terminate && signalled {
                registry.mark_dead(session);
            }
            warn!(session_id, ?kind, signalled, "cancellation request sent");
            Ok(signalled)
        }
        Err(err) => {
            warn!(session_id, ?kind, %err, "cancellation request failed");
            Err(err.to_string())
        }
    }
}

/// Deliver the operation's interrupt.
fn thread_interrupt(target: &CancelTarget) -> CancelAction {
    target.interrupt.interrupt();
    warn!("interrupt delivered to running computation");
    CancelAction::new(CancelKind::ThreadInterrupt, ActionStatus::Delivered)
}

//! Logical connection name → live session bookkeeping.
//!
//! A [`SessionHandle`] is the one place where the runner's task and the
//! watchdog's task meet: the runner executes statements through it while a
//! cancellation strategy reads its session id and liveness from outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::config::ConnectionSettings;
use crate::db::{Connector, DatabaseSession, SessionId};
use crate::{AppError, Result};

/// Shared handle to one logical database session.
pub struct SessionHandle {
    name: String,
    session_id: SessionId,
    settings: Arc<ConnectionSettings>,
    alive: AtomicBool,
    session: Mutex<Box<dyn DatabaseSession>>,
}

impl SessionHandle {
    fn new(name: String, settings: Arc<ConnectionSettings>, session: Box<dyn DatabaseSession>) -> Self {
        Self {
            name,
            session_id: session.session_id(),
            settings,
            alive: AtomicBool::new(true),
            session: Mutex::new(session),
        }
    }

    /// Logical connection name this handle was resolved from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side session identifier, meaningful only while alive.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Location and credentials for opening an administrative connection.
    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Whether the session can still run statements.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Flip liveness off. Returns `true` only for the call that did so.
    fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Execute one statement on this session.
    ///
    /// A dead session is refused without touching the connection. A
    /// `ConnectionLost` failure marks the session dead.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` for a dead or lost session and
    /// whatever the underlying session reports otherwise.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(AppError::ConnectionLost(format!(
                "session {} on '{}' is no longer usable",
                self.session_id, self.name
            )));
        }

        let mut session = self.session.lock().await;
        let result = session.execute(sql).await;
        if let Err(AppError::ConnectionLost(ref reason)) = result {
            if self.mark_dead() {
                warn!(connection = %self.name, session_id = self.session_id, %reason, "session lost");
            }
        }
        result
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("session_id", &self.session_id)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Resolves logical connection names to live sessions.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    connector: Arc<dyn Connector>,
    connections: HashMap<String, Arc<ConnectionSettings>>,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    /// Create a registry over the given connector and named connections.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        connections: HashMap<String, ConnectionSettings>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connector,
                connections: connections
                    .into_iter()
                    .map(|(name, settings)| (name, Arc::new(settings)))
                    .collect(),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Connector used for sessions and administrative connections.
    #[must_use]
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.inner.connector
    }

    /// Resolve a connection name to its session, opening it on first use.
    ///
    /// The same handle is returned until [`reconnect`](Self::reconnect) is
    /// called, including after the session died.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unconfigured name, or the
    /// connector's error if the session cannot be opened.
    pub async fn resolve(&self, name: &str) -> Result<Arc<SessionHandle>> {
        let mut sessions = self.inner.sessions.lock().await;
        if let Some(handle) = sessions.get(name) {
            return Ok(Arc::clone(handle));
        }

        let handle = self.open(name).await?;
        sessions.insert(name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Session already resolved for `name`, without opening one.
    pub async fn cached(&self, name: &str) -> Option<Arc<SessionHandle>> {
        self.inner.sessions.lock().await.get(name).cloned()
    }

    /// Replace a dead session with a freshly opened one.
    ///
    /// A live session is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unconfigured name, or the
    /// connector's error if the session cannot be opened.
    pub async fn reconnect(&self, name: &str) -> Result<Arc<SessionHandle>> {
        let mut sessions = self.inner.sessions.lock().await;
        if let Some(handle) = sessions.get(name) {
            if handle.is_alive() {
                return Ok(Arc::clone(handle));
            }
        }

        let handle = self.open(name).await?;
        info!(connection = name, session_id = handle.session_id(), "session re-established");
        sessions.insert(name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Record that a session was terminated.
    ///
    /// Returns `true` only for the call that changed liveness; repeat calls
    /// are no-ops.
    pub fn mark_dead(&self, handle: &SessionHandle) -> bool {
        let changed = handle.mark_dead();
        if changed {
            info!(
                connection = handle.name(),
                session_id = handle.session_id(),
                "session marked dead"
            );
        }
        changed
    }

    async fn open(&self, name: &str) -> Result<Arc<SessionHandle>> {
        let settings = self
            .inner
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("connection '{name}' is not configured")))?;

        let session = self
            .inner
            .connector
            .connect(&settings)
            .instrument(info_span!("open_session", connection = name))
            .await?;
        let handle = SessionHandle::new(name.to_owned(), settings, session);
        info!(connection = name, session_id = handle.session_id(), "session resolved");
        Ok(Arc::new(handle))
    }
}

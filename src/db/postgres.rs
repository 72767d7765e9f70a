//! `PostgreSQL` backend over `sqlx`.
//!
//! Sessions are plain `PgConnection`s identified by `pg_backend_pid()`.
//! Cancellation goes through a second connection calling
//! `pg_cancel_backend` / `pg_terminate_backend`.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::debug;

use super::{AdminConnection, Connector, DatabaseSession, DbFuture, SessionId};
use crate::config::ConnectionSettings;
use crate::AppError;

/// [`Connector`] for `PostgreSQL` servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

fn connect_options(settings: &ConnectionSettings, application_name: &str) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.database)
        .username(&settings.user)
        .application_name(application_name);
    match &settings.password {
        Some(password) => options.password(password),
        None => options,
    }
}

fn backend_pid(session_id: SessionId) -> crate::Result<i32> {
    i32::try_from(session_id)
        .map_err(|_| AppError::Db(format!("session id {session_id} is not a postgres pid")))
}

impl Connector for PgConnector {
    fn connect<'a>(
        &'a self,
        settings: &'a ConnectionSettings,
    ) -> DbFuture<'a, Box<dyn DatabaseSession>> {
        Box::pin(async move {
            let mut conn =
                PgConnection::connect_with(&connect_options(settings, &settings.application_name))
                    .await?;
            let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
                .fetch_one(&mut conn)
                .await?;
            debug!(host = %settings.host, database = %settings.database, pid, "postgres session opened");
            Ok(Box::new(PgSession { conn, pid }) as Box<dyn DatabaseSession>)
        })
    }

    fn open_admin<'a>(
        &'a self,
        settings: &'a ConnectionSettings,
    ) -> DbFuture<'a, Box<dyn AdminConnection>> {
        Box::pin(async move {
            let application_name = format!("{}-admin", settings.application_name);
            let conn = PgConnection::connect_with(&connect_options(settings, &application_name))
                .await?;
            Ok(Box::new(PgAdmin { conn }) as Box<dyn AdminConnection>)
        })
    }
}

/// Migration session on a dedicated `PgConnection`.
pub struct PgSession {
    conn: PgConnection,
    pid: i32,
}

impl DatabaseSession for PgSession {
    fn session_id(&self) -> SessionId {
        SessionId::from(self.pid)
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> DbFuture<'a, ()> {
        Box::pin(async move {
            // Unparameterised text goes over the simple query protocol, so a
            // step may hold several statements.
            Executor::execute(&mut self.conn, sql).await?;
            Ok(())
        })
    }
}

/// Administrative side channel on its own `PgConnection`.
pub struct PgAdmin {
    conn: PgConnection,
}

impl AdminConnection for PgAdmin {
    fn cancel_statement(&mut self, session_id: SessionId) -> DbFuture<'_, bool> {
        Box::pin(async move {
            let pid = backend_pid(session_id)?;
            let signalled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
                .bind(pid)
                .fetch_one(&mut self.conn)
                .await?;
            Ok(signalled)
        })
    }

    fn terminate_session(&mut self, session_id: SessionId) -> DbFuture<'_, bool> {
        Box::pin(async move {
            let pid = backend_pid(session_id)?;
            let signalled: bool = sqlx::query_scalar("SELECT pg_terminate_backend($1)")
                .bind(pid)
                .fetch_one(&mut self.conn)
                .await?;
            Ok(signalled)
        })
    }

    fn close(self: Box<Self>) -> DbFuture<'static, ()> {
        Box::pin(async move {
            self.conn.close().await?;
            Ok(())
        })
    }
}

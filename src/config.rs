//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::policy::TimeoutPolicy;
use crate::{AppError, Result};

/// Keychain service under which connection passwords are stored.
pub const KEYRING_SERVICE: &str = "migration-watchdog";

fn default_port() -> u16 {
    5432
}

fn default_application_name() -> String {
    "migration-watchdog".into()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("migration-ledger.db")
}

/// Location and credentials of one logical database connection.
///
/// The same settings open the migration session and any administrative
/// connection used to cancel it. The password is loaded at runtime via OS
/// keychain or environment variables, never from the TOML file.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConnectionSettings {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Role used to connect.
    pub user: String,
    /// Password (populated at runtime).
    #[serde(skip)]
    pub password: Option<String>,
    /// Application name reported to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl ConnectionSettings {
    /// Settings with default port and application name and no password.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            database: database.into(),
            user: user.into(),
            password: None,
            application_name: default_application_name(),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` file recording every finished run.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Logical connections by name.
    pub connections: HashMap<String, ConnectionSettings>,
    /// Policy applied to migrations that do not carry their own.
    #[serde(default)]
    pub timeout: TimeoutPolicy,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load every connection's password from OS keychain with env-var fallback.
    ///
    /// A connection with no stored password connects without one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task fails.
    pub async fn load_credentials(&mut self) -> Result<()> {
        for (name, settings) in &mut self.connections {
            settings.password = load_password(name).await?;
        }
        Ok(())
    }

    /// Settings for a named connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no connection has that name.
    pub fn connection(&self, name: &str) -> Result<&ConnectionSettings> {
        self.connections
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("connection '{name}' is not configured")))
    }

    fn validate(&self) -> Result<()> {
        if self.connections.is_empty() {
            return Err(AppError::Config(
                "at least one connection must be configured".into(),
            ));
        }

        for (name, settings) in &self.connections {
            if settings.host.trim().is_empty() {
                return Err(AppError::Config(format!("connection '{name}': host is empty")));
            }
            if settings.database.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "connection '{name}': database is empty"
                )));
            }
            if settings.user.trim().is_empty() {
                return Err(AppError::Config(format!("connection '{name}': user is empty")));
            }
        }

        self.timeout.validate()
    }
}

/// Environment variable consulted for a connection's password.
#[must_use]
pub fn password_env_var(connection: &str) -> String {
    let normalized: String = connection
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("MIGRATION_WATCHDOG_{normalized}_PASSWORD")
}

/// Load a single password from OS keychain with env-var fallback.
async fn load_password(connection: &str) -> Result<Option<String>> {
    let key = format!("{connection}_password");

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(connection, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            debug!(connection, %err, "keychain lookup failed, trying env var");
        }
    }

    let env_key = password_env_var(connection);
    match env::var(&env_key) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ => {
            debug!(connection, env_key, "no password configured; connecting without one");
            Ok(None)
        }
    }
}

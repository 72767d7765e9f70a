use std::path::PathBuf;

use migration_watchdog::config::{password_env_var, ConnectionSettings};
use migration_watchdog::models::policy::CancellationMethod;
use migration_watchdog::{AppError, GlobalConfig};

fn sample_toml() -> &'static str {
    r#"
ledger_path = "state/ledger.db"

[connections.default]
host = "db.internal"
port = 6432
database = "shop"
user = "migrator"
application_name = "shop-migrations"

[connections.reporting]
host = "replica.internal"
database = "reports"
user = "migrator"

[timeout]
deadline_seconds = 30.0
cancellation_method = "both"
safe_interrupt = true
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.ledger_path, PathBuf::from("state/ledger.db"));
    assert_eq!(config.connections.len(), 2);

    let default = config.connection("default").expect("default connection");
    assert_eq!(default.host, "db.internal");
    assert_eq!(default.port, 6432);
    assert_eq!(default.application_name, "shop-migrations");
    assert_eq!(default.password, None);

    let reporting = config.connection("reporting").expect("reporting connection");
    assert_eq!(reporting.port, 5432);
    assert_eq!(reporting.application_name, "migration-watchdog");

    assert_eq!(config.timeout.deadline_seconds, Some(30.0));
    assert_eq!(config.timeout.cancellation_method, CancellationMethod::Both);
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"
"#,
    )
    .expect("config parses");

    assert_eq!(config.ledger_path, PathBuf::from("migration-ledger.db"));
    assert_eq!(config.timeout.deadline(), None);
    assert!(config.timeout.safe_interrupt);
}

#[test]
fn missing_connections_rejected() {
    let err = GlobalConfig::from_toml_str("[connections]\n").expect_err("no connections");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn empty_host_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = " "
database = "app"
user = "app"
"#,
    )
    .expect_err("empty host");
    assert!(err.to_string().contains("host"), "{err}");
}

#[test]
fn invalid_deadline_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"

[timeout]
deadline_seconds = -5.0
"#,
    )
    .expect_err("negative deadline");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn oversized_deadline_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"

[timeout]
deadline_seconds = 1e20
"#,
    )
    .expect_err("deadline too long");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn unknown_method_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"

[timeout]
cancellation_method = "kill"
"#,
    )
    .expect_err("unknown method");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn password_in_toml_is_ignored() {
    let config = GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"
password = "hunter2"
"#,
    )
    .expect("config parses");
    assert_eq!(config.connection("default").expect("default").password, None);
}

#[test]
fn unknown_connection_is_not_found() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");
    assert!(matches!(
        config.connection("analytics"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.connections.len(), 2);

    let missing = GlobalConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(missing, Err(AppError::Config(_))));
}

#[test]
fn debug_redacts_password() {
    let mut settings = ConnectionSettings::new("localhost", "app", "app");
    settings.password = Some("hunter2".into());

    let rendered = format!("{settings:?}");
    assert!(!rendered.contains("hunter2"), "{rendered}");
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn password_env_var_is_normalized() {
    assert_eq!(password_env_var("default"), "MIGRATION_WATCHDOG_DEFAULT_PASSWORD");
    assert_eq!(
        password_env_var("read-replica.eu"),
        "MIGRATION_WATCHDOG_READ_REPLICA_EU_PASSWORD"
    );
}

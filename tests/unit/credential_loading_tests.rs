//! Unit tests for connection password loading.
//!
//! The test environment has no keychain entries for the
//! `migration-watchdog` service, so these exercise the env-var fallback.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use migration_watchdog::GlobalConfig;

fn make_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
[connections.default]
host = "localhost"
database = "app"
user = "app"

[connections.read-replica]
host = "replica"
database = "app"
user = "app"
"#,
    )
    .expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_var_password_is_loaded() {
    let mut config = make_config();

    unsafe {
        std::env::set_var("MIGRATION_WATCHDOG_DEFAULT_PASSWORD", "s3cret");
        std::env::set_var("MIGRATION_WATCHDOG_READ_REPLICA_PASSWORD", "r3plica");
    }

    config.load_credentials().await.expect("load credentials");

    assert_eq!(
        config.connection("default").expect("default").password.as_deref(),
        Some("s3cret")
    );
    assert_eq!(
        config
            .connection("read-replica")
            .expect("replica")
            .password
            .as_deref(),
        Some("r3plica")
    );

    unsafe {
        std::env::remove_var("MIGRATION_WATCHDOG_DEFAULT_PASSWORD");
        std::env::remove_var("MIGRATION_WATCHDOG_READ_REPLICA_PASSWORD");
    }
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_password_is_not_an_error() {
    let mut config = make_config();

    unsafe {
        std::env::remove_var("MIGRATION_WATCHDOG_DEFAULT_PASSWORD");
        std::env::remove_var("MIGRATION_WATCHDOG_READ_REPLICA_PASSWORD");
    }

    config.load_credentials().await.expect("load credentials");

    assert_eq!(config.connection("default").expect("default").password, None);
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_var_is_treated_as_absent() {
    let mut config = make_config();

    unsafe {
        std::env::set_var("MIGRATION_WATCHDOG_DEFAULT_PASSWORD", "");
    }

    config.load_credentials().await.expect("load credentials");
    assert_eq!(config.connection("default").expect("default").password, None);

    unsafe {
        std::env::remove_var("MIGRATION_WATCHDOG_DEFAULT_PASSWORD");
    }
}

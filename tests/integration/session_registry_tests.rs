//! Integration tests for session resolution and liveness tracking.

use std::collections::HashMap;
use std::sync::Arc;

use migration_watchdog::config::ConnectionSettings;
use migration_watchdog::models::migration::DEFAULT_CONNECTION;
use migration_watchdog::orchestrator::session_registry::SessionRegistry;
use migration_watchdog::AppError;

use super::test_helpers::{test_registry, ScriptedDatabase};

#[tokio::test]
async fn resolve_is_stable() {
    let (db, registry) = test_registry();

    let first = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    let second = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.name(), DEFAULT_CONNECTION);
    assert_eq!(first.settings().database, "app");
    assert_eq!(db.sessions_opened(), 1);
}

#[tokio::test]
async fn clones_share_sessions() {
    let (_db, registry) = test_registry();
    let clone = registry.clone();

    let first = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    let second = clone.resolve(DEFAULT_CONNECTION).await.expect("resolve");

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn connections_get_distinct_sessions() {
    let db = ScriptedDatabase::new();
    let settings = HashMap::from([
        (
            DEFAULT_CONNECTION.to_owned(),
            ConnectionSettings::new("localhost", "app", "migrator"),
        ),
        (
            "reporting".to_owned(),
            ConnectionSettings::new("replica", "reports", "migrator"),
        ),
    ]);
    let registry = SessionRegistry::new(Arc::new(db.clone()), settings);

    let main = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    let reporting = registry.resolve("reporting").await.expect("resolve");

    assert_ne!(main.session_id(), reporting.session_id());
    assert_eq!(reporting.settings().host, "replica");
}

#[tokio::test]
async fn unknown_connection_is_not_found() {
    let (_db, registry) = test_registry();

    let err = registry.resolve("missing").await.expect_err("unknown name");

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn mark_dead_is_idempotent() {
    let (_db, registry) = test_registry();
    let handle = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");

    assert!(registry.mark_dead(&handle));
    assert!(!registry.mark_dead(&handle));
    assert!(!handle.is_alive());

    // The dead handle stays cached until the caller reconnects.
    let cached = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    assert!(Arc::ptr_eq(&cached, &handle));
    let err = cached.execute("SELECT 1").await.expect_err("dead session");
    assert!(matches!(err, AppError::ConnectionLost(_)));
}

#[tokio::test]
async fn reconnect_keeps_live_session() {
    let (db, registry) = test_registry();
    let handle = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");

    let same = registry.reconnect(DEFAULT_CONNECTION).await.expect("reconnect");

    assert!(Arc::ptr_eq(&handle, &same));
    assert_eq!(db.sessions_opened(), 1);
}

#[tokio::test]
async fn reconnect_replaces_dead_session() {
    let (db, registry) = test_registry();
    let handle = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    registry.mark_dead(&handle);

    let fresh = registry.reconnect(DEFAULT_CONNECTION).await.expect("reconnect");

    assert!(fresh.is_alive());
    assert_ne!(fresh.session_id(), handle.session_id());
    let resolved = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    assert!(Arc::ptr_eq(&fresh, &resolved));
    assert_eq!(db.sessions_opened(), 2);
}

#[tokio::test]
async fn lost_connection_marks_session_dead() {
    let (db, registry) = test_registry();
    let handle = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");
    db.kill(handle.session_id());

    let err = handle.execute("SELECT 1").await.expect_err("server gone");

    assert!(matches!(err, AppError::ConnectionLost(_)));
    assert!(!handle.is_alive());
}

#[tokio::test]
async fn ordinary_failure_keeps_session_alive() {
    let (db, registry) = test_registry();
    let handle = registry.resolve(DEFAULT_CONNECTION).await.expect("resolve");

    let err = handle.execute("FAIL SELECT").await.expect_err("bad sql");

    assert!(matches!(err, AppError::Db(_)));
    assert!(handle.is_alive());
    handle.execute("SELECT 1").await.expect("still usable");
    assert_eq!(db.executed(), vec!["FAIL SELECT", "SELECT 1"]);
}

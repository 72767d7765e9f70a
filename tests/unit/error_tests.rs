//! Unit tests for `AppError` display format and classification.

use migration_watchdog::AppError;

#[test]
fn display_prefixes_variant() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(
        AppError::StatementCancelled("user request".into()).to_string(),
        "statement cancelled: user request"
    );
    assert_eq!(
        AppError::ConnectionLost("eof".into()).to_string(),
        "connection lost: eof"
    );
    assert_eq!(
        AppError::Irreversible("sql: UPDATE t".into()).to_string(),
        "irreversible: sql: UPDATE t"
    );
}

#[test]
fn interruption_shaped_errors() {
    assert!(AppError::StatementCancelled(String::new()).is_interruption());
    assert!(AppError::ConnectionLost(String::new()).is_interruption());
    assert!(AppError::Interrupted(String::new()).is_interruption());

    assert!(!AppError::Db(String::new()).is_interruption());
    assert!(!AppError::Operation(String::new()).is_interruption());
    assert!(!AppError::Irreversible(String::new()).is_interruption());
    assert!(!AppError::NotFound(String::new()).is_interruption());
}

#[test]
fn toml_errors_become_config_errors() {
    let err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    assert!(matches!(AppError::from(err), AppError::Config(_)));
}

#[test]
fn transport_errors_are_connection_loss() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
    assert!(matches!(
        AppError::from(sqlx::Error::Io(io)),
        AppError::ConnectionLost(_)
    ));
    assert!(matches!(
        AppError::from(sqlx::Error::PoolClosed),
        AppError::ConnectionLost(_)
    ));
}

#[test]
fn other_sqlx_errors_are_db_errors() {
    assert!(matches!(
        AppError::from(sqlx::Error::RowNotFound),
        AppError::Db(_)
    ));
}

#[test]
fn io_errors_map_to_io() {
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    assert_eq!(AppError::from(err), AppError::Io("missing".into()));
}

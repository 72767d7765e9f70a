use std::time::Duration;

use migration_watchdog::models::migration::{
    Direction, Migration, MigrationRun, OperationState, DEFAULT_CONNECTION,
};
use migration_watchdog::models::outcome::{
    ActionStatus, CancelAction, CancelKind, FailureReport, Outcome, OutcomeKind, TimeoutReport,
};
use migration_watchdog::models::policy::{CancellationMethod, TimeoutPolicy};
use migration_watchdog::operations::{MigrationOperation, RunCode, RunSql, Substrate};
use migration_watchdog::AppError;

fn three_step() -> Migration {
    Migration::new("inventory", "0007_split")
        .with_operation(RunSql::new("ALTER TABLE item ADD COLUMN sku text"))
        .with_operation(RunCode::pause(Duration::from_millis(10)))
        .with_operation(RunSql::new("ALTER TABLE item DROP COLUMN code"))
}

#[test]
fn migration_defaults() {
    let migration = three_step();
    assert_eq!(migration.connection, DEFAULT_CONNECTION);
    assert!(migration.timeout.is_none());

    let pinned = three_step()
        .on_connection("reporting")
        .with_timeout(TimeoutPolicy::default());
    assert_eq!(pinned.connection, "reporting");
    assert!(pinned.timeout.is_some());
}

#[test]
fn forward_schedule_is_declared_order() {
    let run = MigrationRun::new(three_step(), Direction::Forward);
    assert_eq!(run.schedule(), vec![0, 1, 2]);
    assert!(run.records.iter().all(|r| r.state == OperationState::Idle));
    assert_eq!(run.state(3), None);
}

#[test]
fn backward_schedule_is_reversed() {
    let run = MigrationRun::new(three_step(), Direction::Backward);
    assert_eq!(run.schedule(), vec![2, 1, 0]);
}

#[test]
fn runs_get_distinct_ids() {
    let a = MigrationRun::new(three_step(), Direction::Forward);
    let b = MigrationRun::new(three_step(), Direction::Forward);
    assert_ne!(a.id, b.id);
}

#[test]
fn terminal_states() {
    assert!(!OperationState::Idle.is_terminal());
    assert!(!OperationState::Running.is_terminal());
    assert!(OperationState::Completed.is_terminal());
    assert!(OperationState::TimedOut.is_terminal());
    assert!(OperationState::Failed.is_terminal());
}

#[test]
fn direction_names() {
    assert_eq!(Direction::parse("forward").expect("parse"), Direction::Forward);
    assert_eq!(Direction::Backward.to_string(), "backward");
    assert!(Direction::parse("sideways").is_err());
}

#[test]
fn operation_substrates() {
    assert_eq!(RunSql::new("SELECT 1").substrate(), Substrate::Database);
    assert_eq!(
        RunCode::new("noop", |_interrupt| async { Ok(()) }).substrate(),
        Substrate::Computation
    );
}

#[test]
fn long_sql_descriptions_are_truncated() {
    let sql = format!("SELECT {}", "x, ".repeat(40));
    let description = RunSql::new(sql).describe();
    assert!(description.ends_with("..."));
    assert!(description.chars().count() <= "sql: ".len() + 60 + 3);
}

#[test]
fn outcome_accessors() {
    let timed_out = Outcome::TimedOut(TimeoutReport {
        operation: 2,
        method: CancellationMethod::Query,
        actions: vec![CancelAction::new(CancelKind::QueryCancel, ActionStatus::Delivered)],
        session_usable_after: true,
        cause: AppError::StatementCancelled("user request".into()),
    });
    assert!(timed_out.is_timed_out());
    assert_eq!(timed_out.kind(), OutcomeKind::TimedOut);
    assert_eq!(timed_out.stopped_at(), Some(2));
    assert_eq!(timed_out.session_usable_after(), Some(true));

    let failed = Outcome::Failed(FailureReport {
        operation: 1,
        cause: AppError::Db("boom".into()),
    });
    assert_eq!(failed.kind(), OutcomeKind::Failed);
    assert_eq!(failed.cause(), Some(&AppError::Db("boom".into())));
    assert_eq!(failed.session_usable_after(), None);

    assert!(Outcome::Completed.is_completed());
    assert_eq!(Outcome::Completed.stopped_at(), None);
    assert_eq!(Outcome::Completed.cause(), None);
}

#[test]
fn outcome_kind_names() {
    for kind in [OutcomeKind::Completed, OutcomeKind::TimedOut, OutcomeKind::Failed] {
        assert_eq!(OutcomeKind::parse(kind.as_str()).expect("parse"), kind);
    }
    assert_eq!(OutcomeKind::TimedOut.as_str(), "timed_out");
}

#[test]
fn cancel_actions_serialize_as_snake_case() {
    let actions = vec![
        CancelAction::new(CancelKind::QueryCancel, ActionStatus::SkippedDeadSession),
        CancelAction::new(CancelKind::Terminate, ActionStatus::Failed("refused".into())),
    ];
    let json = serde_json::to_string(&actions).expect("serialize");
    assert!(json.contains(r#""kind":"query_cancel""#), "{json}");
    assert!(json.contains(r#""status":"skipped_dead_session""#), "{json}");
    assert!(json.contains(r#""failed":"refused""#), "{json}");
}

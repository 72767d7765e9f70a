//! Deadline enforcement orchestration.
//!
//! Covers the per-operation watchdog, the cancellation strategies it
//! triggers, the registry that lets those strategies reach a session from
//! another task, and the runner tying them together.

pub mod cancellation;
pub mod interrupt;
pub mod runner;
pub mod session_registry;
pub mod watchdog;

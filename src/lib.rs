#![forbid(unsafe_code)]

//! Per-operation deadlines for database schema migrations.

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod operations;
pub mod orchestrator;
pub mod persistence;
pub mod plan;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

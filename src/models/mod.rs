//! Domain model module declarations.

pub mod migration;
pub mod outcome;
pub mod policy;

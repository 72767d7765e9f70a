//! Timeout policy attached to a migration or a single run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// How a stalled operation is interrupted once its deadline elapses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMethod {
    /// Cancel the database session's running statement (or terminate the
    /// session when the policy is not a safe interrupt).
    Query,
    /// Deliver an interrupt to the executing computation.
    Interrupt,
    /// Both of the above, `Query` first.
    Both,
}

impl CancellationMethod {
    /// Stable lowercase name used in logs and the run ledger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Interrupt => "interrupt",
            Self::Both => "both",
        }
    }

    /// Parse the stable name produced by [`as_str`](Self::as_str).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unknown method name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "query" => Ok(Self::Query),
            "interrupt" => Ok(Self::Interrupt),
            "both" => Ok(Self::Both),
            other => Err(AppError::Config(format!(
                "unknown cancellation method: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for CancellationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest deadline or pause accepted from configuration: one year.
pub const MAX_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Convert a configured number of seconds into a [`Duration`].
///
/// # Errors
///
/// Returns `AppError::Config` naming `field` if `secs` is negative, NaN,
/// infinite, or longer than [`MAX_SECONDS`].
pub fn bounded_seconds(field: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(AppError::Config(format!(
            "{field} must be a non-negative number, got {secs}"
        )));
    }
    if secs > MAX_SECONDS {
        return Err(AppError::Config(format!(
            "{field} must be at most {MAX_SECONDS} seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|err| AppError::Config(format!("{field} is out of range: {err}")))
}

/// Infallible counterpart of [`bounded_seconds`] for already validated input.
pub(crate) fn clamp_seconds(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.clamp(0.0, MAX_SECONDS))
}

fn default_method() -> CancellationMethod {
    CancellationMethod::Query
}

fn default_true() -> bool {
    true
}

/// Hard time budget for each operation of a migration.
///
/// The runner copies the policy when a run starts, so edits made afterwards
/// never affect an in-flight run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutPolicy {
    /// Per-operation budget in seconds; `None` disables enforcement.
    #[serde(default)]
    pub deadline_seconds: Option<f64>,
    /// Strategy applied when the budget is exceeded.
    #[serde(default = "default_method")]
    pub cancellation_method: CancellationMethod,
    /// `true` cancels only the running statement; `false` terminates the
    /// whole session.
    #[serde(default = "default_true")]
    pub safe_interrupt: bool,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            deadline_seconds: None,
            cancellation_method: default_method(),
            safe_interrupt: true,
        }
    }
}

/// Operator-supplied adjustments layered on top of a configured policy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolicyOverrides {
    /// Replacement deadline, in seconds.
    pub deadline_seconds: Option<f64>,
    /// Drop the deadline entirely.
    pub no_deadline: bool,
    /// Replacement cancellation method.
    pub cancellation_method: Option<CancellationMethod>,
    /// Force destructive session termination.
    pub unsafe_interrupt: bool,
}

impl TimeoutPolicy {
    /// Build a validated policy.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `deadline_seconds` is not a finite,
    /// positive number.
    pub fn new(
        deadline_seconds: Option<f64>,
        cancellation_method: CancellationMethod,
        safe_interrupt: bool,
    ) -> Result<Self> {
        let policy = Self {
            deadline_seconds,
            cancellation_method,
            safe_interrupt,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Policy that never enforces a deadline.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check the deadline is usable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `deadline_seconds` is zero, negative,
    /// NaN, infinite, or longer than [`MAX_SECONDS`].
    pub fn validate(&self) -> Result<()> {
        match self.deadline_seconds {
            Some(secs) if secs <= 0.0 => Err(AppError::Config(format!(
                "deadline_seconds must be a positive number, got {secs}"
            ))),
            Some(secs) => bounded_seconds("deadline_seconds", secs).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Deadline as a [`Duration`], or `None` when enforcement is off.
    ///
    /// Values outside the accepted range are clamped into it.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(clamp_seconds)
    }

    /// Apply operator overrides and re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the resulting deadline is invalid.
    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Result<Self> {
        if overrides.no_deadline {
            self.deadline_seconds = None;
        } else if let Some(secs) = overrides.deadline_seconds {
            self.deadline_seconds = Some(secs);
        }
        if let Some(method) = overrides.cancellation_method {
            self.cancellation_method = method;
        }
        if overrides.unsafe_interrupt {
            self.safe_interrupt = false;
        }
        self.validate()?;
        Ok(self)
    }
}

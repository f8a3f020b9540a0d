//! Error types for mcsim.
//!
//! Every fallible operation returns `Result<T, SimError>` instead of
//! panicking. Per-trial evaluation failures are a separate type
//! ([`crate::model::EvalError`]) because they are recorded, not propagated.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for mcsim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Stage of a simulation run at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request validation, before any randomness is consumed.
    Validation,
    /// Trial execution.
    Running,
    /// Statistical aggregation.
    Aggregation,
    /// Service setup or an unexpected fault.
    Service,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Running => write!(f, "running"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Unified error type for all mcsim operations.
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Request Errors =====
    /// Malformed or out-of-range request field.
    #[error("Validation error at '{field}': {message}")]
    Validation {
        /// Path of the offending field (e.g. `variables[1].name`).
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Distribution parameters violate the distribution's invariants.
    #[error("Invalid distribution for variable '{variable}': {message}")]
    InvalidDistribution {
        /// Variable the distribution is bound to.
        variable: String,
        /// Violated invariant.
        message: String,
    },

    // ===== Run Errors =====
    /// Too many trials failed for the summary to be meaningful.
    #[error("Excessive failures: {failed} of {executed} trials failed (max ratio {max_ratio})")]
    ExcessiveFailure {
        /// Failed trial count.
        failed: usize,
        /// Executed trial count.
        executed: usize,
        /// Configured maximum failure ratio.
        max_ratio: f64,
    },

    /// No trial produced a usable result.
    #[error("No valid trials: all {attempted} trials failed or did not run")]
    NoValidTrials {
        /// Trials requested.
        attempted: usize,
    },

    /// A summary statistic fell outside the range of `f64`.
    #[error("Statistic '{statistic}' of output '{output}' is not finite")]
    NonFiniteStatistic {
        /// Output the summary belongs to.
        output: String,
        /// Offending statistic (e.g. `variance`).
        statistic: &'static str,
    },

    /// The run exceeded its deadline without enough successful trials.
    #[error("Timeout after {elapsed_ms} ms: {succeeded} trials succeeded, {required} required")]
    Timeout {
        /// Wall-clock time spent.
        elapsed_ms: u64,
        /// Successful trials completed before the deadline.
        succeeded: usize,
        /// Minimum successes needed for a partial summary.
        required: usize,
    },

    /// Unexpected fault.
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== Configuration Errors =====
    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Declarative configuration check failed.
    #[error("Configuration validation error: {0}")]
    ConfigValidation(#[from] validator::ValidationErrors),

    // ===== I/O Errors =====
    /// File or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Create a validation error for a request field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-distribution error.
    #[must_use]
    pub fn invalid_distribution(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDistribution {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Stable machine-readable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidDistribution { .. } => "invalid_distribution_error",
            Self::ExcessiveFailure { .. } => "excessive_failure_error",
            Self::NoValidTrials { .. } => "no_valid_trials_error",
            Self::NonFiniteStatistic { .. } => "non_finite_statistic_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Internal(_)
            | Self::Config { .. }
            | Self::YamlParse(_)
            | Self::ConfigValidation(_)
            | Self::Io(_)
            | Self::Serialization(_) => "internal_error",
        }
    }

    /// Stage of the run this error belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Validation { .. } | Self::InvalidDistribution { .. } => Stage::Validation,
            Self::ExcessiveFailure { .. } | Self::Timeout { .. } => Stage::Running,
            Self::NoValidTrials { .. } | Self::NonFiniteStatistic { .. } => Stage::Aggregation,
            Self::Internal(_)
            | Self::Config { .. }
            | Self::YamlParse(_)
            | Self::ConfigValidation(_)
            | Self::Io(_)
            | Self::Serialization(_) => Stage::Service,
        }
    }

    /// Offending request field, when known.
    #[must_use]
    pub fn field(&self) -> Option<String> {
        match self {
            Self::Validation { field, .. } => Some(field.clone()),
            Self::InvalidDistribution { variable, .. } => Some(format!("variables.{variable}")),
            Self::NonFiniteStatistic { output, .. } => Some(format!("outputs.{output}")),
            _ => None,
        }
    }

    /// Check if the caller sent a bad request (as opposed to a run failure).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::InvalidDistribution { .. }
        )
    }
}

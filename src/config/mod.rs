//! Service configuration with YAML schema and validation.
//!
//! Mistake-proofing happens in three layers:
//! - Type-safe configuration structs (`deny_unknown_fields`)
//! - Declarative range checks via `validator`
//! - Semantic cross-field checks in [`ServiceConfig::validate_semantic`]

use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::error::{SimError, SimResult};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// HTTP listener settings.
    #[validate(nested)]
    #[serde(default)]
    pub server: ServerConfig,

    /// Request limits.
    #[validate(nested)]
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Trial execution settings.
    #[validate(nested)]
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl ServiceConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Run declarative and semantic validation.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn check(&self) -> SimResult<()> {
        self.validate()?;
        self.validate_semantic()
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validate cross-field constraints beyond schema.
    fn validate_semantic(&self) -> SimResult<()> {
        let limits = &self.limits;
        if limits.default_histogram_bins > limits.max_histogram_bins {
            return Err(SimError::config(format!(
                "default_histogram_bins ({}) exceeds max_histogram_bins ({})",
                limits.default_histogram_bins, limits.max_histogram_bins
            )));
        }
        if self.runner.default_timeout_ms > limits.max_timeout_ms {
            return Err(SimError::config(format!(
                "runner.default_timeout_ms ({}) exceeds limits.max_timeout_ms ({})",
                self.runner.default_timeout_ms, limits.max_timeout_ms
            )));
        }
        if self.runner.workers == Some(0) {
            return Err(SimError::config("runner.workers must be at least 1"));
        }
        Ok(())
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    max_trials: Option<usize>,
    workers: Option<usize>,
    chunk_size: Option<usize>,
    max_failure_ratio: Option<f64>,
    default_timeout_ms: Option<u64>,
    max_concurrent_runs: Option<usize>,
}

impl ServiceConfigBuilder {
    /// Set the listen host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the listen port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the maximum trials per request.
    #[must_use]
    pub const fn max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = Some(max_trials);
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the number of trials per scheduling chunk.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set the maximum tolerated failure ratio.
    #[must_use]
    pub const fn max_failure_ratio(mut self, ratio: f64) -> Self {
        self.max_failure_ratio = Some(ratio);
        self
    }

    /// Set the default run timeout.
    #[must_use]
    pub const fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = Some(ms);
        self
    }

    /// Set how many simulations may run at once.
    #[must_use]
    pub const fn max_concurrent_runs(mut self, runs: usize) -> Self {
        self.max_concurrent_runs = Some(runs);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ServiceConfig {
        let mut config = ServiceConfig::default();

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_trials) = self.max_trials {
            config.limits.max_trials = max_trials;
        }
        if let Some(workers) = self.workers {
            config.runner.workers = Some(workers);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.runner.chunk_size = chunk_size;
        }
        if let Some(ratio) = self.max_failure_ratio {
            config.runner.max_failure_ratio = ratio;
        }
        if let Some(ms) = self.default_timeout_ms {
            config.runner.default_timeout_ms = ms;
            config.limits.max_timeout_ms = config.limits.max_timeout_ms.max(ms);
        }
        if let Some(runs) = self.max_concurrent_runs {
            config.runner.max_concurrent_runs = runs;
        }

        config
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[validate(length(min = 1))]
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-request limits enforced during validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum trials per request.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    /// Maximum input variables per request.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_variables")]
    pub max_variables: usize,
    /// Maximum percentiles per request.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_percentiles")]
    pub max_percentiles: usize,
    /// Maximum histogram bins.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_histogram_bins")]
    pub max_histogram_bins: usize,
    /// Histogram bins when the request does not say.
    #[validate(range(min = 1))]
    #[serde(default = "default_histogram_bins")]
    pub default_histogram_bins: usize,
    /// Maximum raw samples returned when retention is requested.
    #[serde(default = "default_max_raw_samples")]
    pub max_raw_samples: usize,
    /// Upper bound for per-request timeouts.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// Maximum formula length in bytes.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_expression_len")]
    pub max_expression_len: usize,
}

const fn default_max_trials() -> usize {
    1_000_000
}

const fn default_max_variables() -> usize {
    64
}

const fn default_max_percentiles() -> usize {
    32
}

const fn default_max_histogram_bins() -> usize {
    1_000
}

const fn default_histogram_bins() -> usize {
    20
}

const fn default_max_raw_samples() -> usize {
    10_000
}

const fn default_max_timeout_ms() -> u64 {
    60_000
}

const fn default_max_expression_len() -> usize {
    4_096
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_trials: default_max_trials(),
            max_variables: default_max_variables(),
            max_percentiles: default_max_percentiles(),
            max_histogram_bins: default_max_histogram_bins(),
            default_histogram_bins: default_histogram_bins(),
            max_raw_samples: default_max_raw_samples(),
            max_timeout_ms: default_max_timeout_ms(),
            max_expression_len: default_max_expression_len(),
        }
    }
}

/// Trial execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Worker threads; `None` uses available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Consecutive trials handed to a worker at once.
    #[validate(range(min = 1))]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Failed / executed trials above this fails the run.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
    /// Wall-clock budget when the request does not set one.
    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Simulations allowed to run at once; later requests wait for a slot.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

const fn default_chunk_size() -> usize {
    crate::engine::pool::DEFAULT_CHUNK_SIZE
}

const fn default_max_failure_ratio() -> f64 {
    0.5
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_max_concurrent_runs() -> usize {
    2
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_size: default_chunk_size(),
            max_failure_ratio: default_max_failure_ratio(),
            default_timeout_ms: default_timeout_ms(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,
    /// Emit newline-delimited JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational.
    #[default]
    Info,
    /// Debugging detail.
    Debug,
    /// Everything.
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

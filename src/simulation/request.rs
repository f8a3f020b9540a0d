//! Simulation requests and their validation.
//!
//! [`SimulationRequest`] is the wire form. [`SimulationRequest::validate`]
//! checks it against the configured limits and compiles every distribution
//! and formula, producing an immutable [`ValidatedRequest`]. No randomness is
//! consumed before validation succeeds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{SimError, SimResult};
use crate::model::{is_identifier, CompiledModel, Distribution, DistributionSpec, ModelSpec};

/// Percentiles reported when the request does not list any.
pub const DEFAULT_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

/// Simulation request as sent by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationRequest {
    /// Number of trials to run.
    pub trials: u64,
    /// Master seed; a fresh one is drawn when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Input variables, in sampling order.
    pub variables: Vec<VariableSpec>,
    /// Model mapping inputs to outputs.
    pub model: ModelSpec,
    /// Percentiles to report, each in `[0, 100]`.
    #[serde(default)]
    pub percentiles: Option<Vec<f64>>,
    /// Histogram bin count.
    #[serde(default)]
    pub histogram_bins: Option<usize>,
    /// Return raw per-trial samples.
    #[serde(default)]
    pub include_samples: Option<bool>,
    /// Wall-clock budget for the run.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// An input variable bound to a distribution.
///
/// The distribution is kept loosely typed here so that a bad kind or bad
/// parameters are reported against the variable instead of as a generic
/// body error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    /// Identifier used in formulas.
    pub name: String,
    /// Distribution kind (`uniform`, `normal`, ...).
    pub distribution: String,
    /// Kind-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl VariableSpec {
    /// Parse the kind and parameters into a typed [`DistributionSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidDistribution`] for an unknown kind or
    /// missing, extra, or mistyped parameters.
    pub fn distribution_spec(&self) -> SimResult<DistributionSpec> {
        let tagged = serde_json::json!({
            "distribution": self.distribution,
            "params": self.params,
        });
        serde_json::from_value(tagged)
            .map_err(|e| SimError::invalid_distribution(&self.name, e.to_string()))
    }
}

/// A request that passed validation, with every part compiled.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Number of trials.
    pub trials: usize,
    /// Seed from the request, if any.
    pub seed: Option<u64>,
    /// Variable names in sampling order.
    pub variable_names: Vec<String>,
    /// Samplers, parallel to `variable_names`.
    pub distributions: Vec<Distribution>,
    /// Parsed model.
    pub model: CompiledModel,
    /// Sorted, de-duplicated percentiles.
    pub percentiles: Vec<f64>,
    /// Histogram bin count.
    pub histogram_bins: usize,
    /// Whether to return raw samples.
    pub include_samples: bool,
    /// Effective run timeout.
    pub timeout: Duration,
    /// Adjustments made during validation.
    pub warnings: Vec<String>,
}

impl SimulationRequest {
    /// Check the request against `config` and compile it.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Validation`] or [`SimError::InvalidDistribution`]
    /// for the first problem found.
    pub fn validate(&self, config: &ServiceConfig) -> SimResult<ValidatedRequest> {
        let limits = &config.limits;
        let mut warnings = Vec::new();

        let trials = usize::try_from(self.trials)
            .map_err(|_| SimError::validation("trials", "trial count does not fit in memory"))?;
        if trials == 0 {
            return Err(SimError::validation("trials", "must be greater than 0"));
        }
        if trials > limits.max_trials {
            return Err(SimError::validation(
                "trials",
                format!("{trials} exceeds the maximum of {}", limits.max_trials),
            ));
        }

        let (variable_names, distributions) = self.validate_variables(config)?;

        let model = self
            .model
            .compile(&variable_names, limits.max_expression_len)
            .map_err(|e| SimError::validation(e.field, e.message))?;

        let percentiles = self.validate_percentiles(config)?;

        let histogram_bins = match self.histogram_bins {
            None => limits.default_histogram_bins,
            Some(0) => return Err(SimError::validation("histogram_bins", "must be greater than 0")),
            Some(bins) if bins > limits.max_histogram_bins => {
                return Err(SimError::validation(
                    "histogram_bins",
                    format!("{bins} exceeds the maximum of {}", limits.max_histogram_bins),
                ))
            }
            Some(bins) => bins,
        };

        let timeout_ms = match self.timeout_ms {
            None => config.runner.default_timeout_ms.min(limits.max_timeout_ms),
            Some(0) => return Err(SimError::validation("timeout_ms", "must be greater than 0")),
            Some(ms) if ms > limits.max_timeout_ms => {
                warnings.push(format!(
                    "timeout_ms {ms} capped to the configured maximum of {}",
                    limits.max_timeout_ms
                ));
                limits.max_timeout_ms
            }
            Some(ms) => ms,
        };

        Ok(ValidatedRequest {
            trials,
            seed: self.seed,
            variable_names,
            distributions,
            model,
            percentiles,
            histogram_bins,
            include_samples: self.include_samples.unwrap_or(false),
            timeout: Duration::from_millis(timeout_ms),
            warnings,
        })
    }

    fn validate_variables(
        &self,
        config: &ServiceConfig,
    ) -> SimResult<(Vec<String>, Vec<Distribution>)> {
        if self.variables.is_empty() {
            return Err(SimError::validation("variables", "at least one variable is required"));
        }
        if self.variables.len() > config.limits.max_variables {
            return Err(SimError::validation(
                "variables",
                format!(
                    "{} variables exceeds the maximum of {}",
                    self.variables.len(),
                    config.limits.max_variables
                ),
            ));
        }

        let mut names: Vec<String> = Vec::with_capacity(self.variables.len());
        let mut distributions = Vec::with_capacity(self.variables.len());
        for (i, var) in self.variables.iter().enumerate() {
            if !is_identifier(&var.name) {
                return Err(SimError::validation(
                    format!("variables[{i}].name"),
                    format!("'{}' is not a valid identifier", var.name),
                ));
            }
            if names.contains(&var.name) {
                return Err(SimError::validation(
                    format!("variables[{i}].name"),
                    format!("duplicate variable name '{}'", var.name),
                ));
            }

            let dist = var
                .distribution_spec()?
                .compile()
                .map_err(|m| SimError::invalid_distribution(&var.name, m))?;
            names.push(var.name.clone());
            distributions.push(dist);
        }
        Ok((names, distributions))
    }

    fn validate_percentiles(&self, config: &ServiceConfig) -> SimResult<Vec<f64>> {
        let Some(requested) = &self.percentiles else {
            return Ok(DEFAULT_PERCENTILES.to_vec());
        };
        if requested.len() > config.limits.max_percentiles {
            return Err(SimError::validation(
                "percentiles",
                format!(
                    "{} percentiles exceeds the maximum of {}",
                    requested.len(),
                    config.limits.max_percentiles
                ),
            ));
        }

        let mut percentiles = Vec::with_capacity(requested.len());
        for (i, &p) in requested.iter().enumerate() {
            if !(0.0..=100.0).contains(&p) {
                return Err(SimError::validation(
                    format!("percentiles[{i}]"),
                    format!("{p} is outside [0, 100]"),
                ));
            }
            // -0.0 would otherwise be labelled "-0"
            percentiles.push(p + 0.0);
        }
        percentiles.sort_by(f64::total_cmp);
        percentiles.dedup();
        Ok(percentiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> SimulationRequest {
        serde_json::from_value(value).unwrap()
    }

    fn uniform_identity(trials: u64) -> SimulationRequest {
        request(json!({
            "trials": trials,
            "seed": 42,
            "variables": [
                {"name": "x", "distribution": "uniform", "params": {"low": 0.0, "high": 1.0}}
            ],
            "model": "identity"
        }))
    }

    fn field_of(err: &SimError) -> String {
        err.field().unwrap_or_default()
    }

    #[test]
    fn test_valid_request_defaults() {
        let config = ServiceConfig::default();
        let v = uniform_identity(100).validate(&config).unwrap();

        assert_eq!(v.trials, 100);
        assert_eq!(v.seed, Some(42));
        assert_eq!(v.variable_names, ["x"]);
        assert_eq!(v.percentiles, DEFAULT_PERCENTILES.to_vec());
        assert_eq!(v.histogram_bins, config.limits.default_histogram_bins);
        assert!(!v.include_samples);
        assert_eq!(
            v.timeout,
            Duration::from_millis(config.runner.default_timeout_ms)
        );
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_trials_bounds() {
        let config = ServiceConfig::builder().max_trials(1000).build();

        let err = uniform_identity(0).validate(&config).unwrap_err();
        assert_eq!(field_of(&err), "trials");

        let err = uniform_identity(1001).validate(&config).unwrap_err();
        assert!(matches!(err, SimError::Validation { .. }));
        assert!(err.to_string().contains("1000"));

        assert!(uniform_identity(1000).validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_distribution_params() {
        let req = request(json!({
            "trials": 10,
            "variables": [
                {"name": "x", "distribution": "uniform", "params": {"low": 2.0, "high": 1.0}}
            ],
            "model": "x"
        }));
        let err = req.validate(&ServiceConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidDistribution { ref variable, .. } if variable == "x"));
    }

    #[test]
    fn test_unknown_distribution_kind() {
        let req = request(json!({
            "trials": 10,
            "variables": [
                {"name": "x", "distribution": "cauchy", "params": {"x0": 0.0}}
            ],
            "model": "x"
        }));
        let err = req.validate(&ServiceConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "invalid_distribution_error");
        assert!(err.to_string().contains("cauchy"));
    }

    #[test]
    fn test_missing_params_rejected() {
        let req = request(json!({
            "trials": 10,
            "variables": [{"name": "x", "distribution": "normal"}],
            "model": "x"
        }));
        assert!(req.validate(&ServiceConfig::default()).is_err());
    }

    #[test]
    fn test_variable_names() {
        let config = ServiceConfig::default();
        let dup = request(json!({
            "trials": 10,
            "variables": [
                {"name": "x", "distribution": "constant", "params": {"value": 1.0}},
                {"name": "x", "distribution": "constant", "params": {"value": 2.0}}
            ],
            "model": "x"
        }));
        let err = dup.validate(&config).unwrap_err();
        assert_eq!(field_of(&err), "variables[1].name");
        assert!(err.to_string().contains("duplicate"));

        let bad = request(json!({
            "trials": 10,
            "variables": [{"name": "unit cost", "distribution": "constant", "params": {"value": 1.0}}],
            "model": "1"
        }));
        assert_eq!(field_of(&bad.validate(&config).unwrap_err()), "variables[0].name");

        let empty = request(json!({"trials": 10, "variables": [], "model": "1"}));
        assert_eq!(field_of(&empty.validate(&config).unwrap_err()), "variables");
    }

    #[test]
    fn test_model_errors_become_validation() {
        let req = request(json!({
            "trials": 10,
            "variables": [{"name": "x", "distribution": "constant", "params": {"value": 1.0}}],
            "model": "x + y"
        }));
        let err = req.validate(&ServiceConfig::default()).unwrap_err();
        assert_eq!(field_of(&err), "model");
        assert!(err.to_string().contains('y'));
    }

    #[test]
    fn test_percentiles_sorted_and_checked() {
        let config = ServiceConfig::default();
        let mut req = uniform_identity(10);
        req.percentiles = Some(vec![90.0, 10.0, 50.0, 10.0]);
        assert_eq!(req.validate(&config).unwrap().percentiles, vec![10.0, 50.0, 90.0]);

        req.percentiles = Some(vec![50.0, 101.0]);
        let err = req.validate(&config).unwrap_err();
        assert_eq!(field_of(&err), "percentiles[1]");

        req.percentiles = Some(vec![f64::NAN]);
        assert!(req.validate(&config).is_err());
    }

    #[test]
    fn test_negative_zero_percentile_merges_with_zero() {
        let mut req = uniform_identity(10);
        req.percentiles = Some(vec![-0.0, 0.0, 50.0]);
        let validated = req.validate(&ServiceConfig::default()).unwrap();
        assert_eq!(validated.percentiles, vec![0.0, 50.0]);
        assert!(validated.percentiles[0].is_sign_positive());
        assert_eq!(crate::simulation::aggregate::percentile_label(validated.percentiles[0]), "0");
    }

    #[test]
    fn test_histogram_bins_bounds() {
        let config = ServiceConfig::default();
        let mut req = uniform_identity(10);
        req.histogram_bins = Some(0);
        assert_eq!(field_of(&req.validate(&config).unwrap_err()), "histogram_bins");

        req.histogram_bins = Some(config.limits.max_histogram_bins + 1);
        assert!(req.validate(&config).is_err());

        req.histogram_bins = Some(7);
        assert_eq!(req.validate(&config).unwrap().histogram_bins, 7);
    }

    #[test]
    fn test_timeout_capped_with_warning() {
        let config = ServiceConfig::default();
        let mut req = uniform_identity(10);
        req.timeout_ms = Some(config.limits.max_timeout_ms * 2);
        let v = req.validate(&config).unwrap();
        assert_eq!(v.timeout, Duration::from_millis(config.limits.max_timeout_ms));
        assert_eq!(v.warnings.len(), 1);

        req.timeout_ms = Some(0);
        assert!(req.validate(&config).is_err());
    }

    #[test]
    fn test_unknown_request_field_rejected() {
        let result: Result<SimulationRequest, _> = serde_json::from_value(json!({
            "trials": 10,
            "variables": [],
            "model": "1",
            "iterations": 5
        }));
        assert!(result.is_err());
    }
}

//! Simulation response shape.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::aggregate::OutputSummary;
use super::runner::{TrialFailure, TrialResult};

/// Result of a completed simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    /// Trials asked for.
    pub trials_requested: usize,
    /// Trials whose model evaluation succeeded.
    pub trials_succeeded: usize,
    /// Master seed the run used.
    pub seed_used: u64,
    /// Summary per output, in model order.
    pub outputs: IndexMap<String, OutputSummary>,
    /// One entry per failed or unexecuted trial, by trial index.
    pub errors: Vec<TrialError>,
    /// Non-fatal notes about the run.
    pub warnings: Vec<String>,
    /// Whether the deadline cut the run short.
    pub timed_out: bool,
    /// Wall-clock time from receipt to response.
    pub elapsed_ms: u64,
    /// Raw successful trials, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<Sample>>,
}

/// A failed or unexecuted trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialError {
    /// Trial index.
    pub trial_index: usize,
    /// Why it failed.
    pub message: String,
    /// Inputs that triggered the failure; absent if the trial never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<IndexMap<String, f64>>,
}

impl TrialError {
    pub(crate) fn from_failure(failure: &TrialFailure, variables: &[String]) -> Self {
        Self {
            trial_index: failure.index,
            message: failure.message.clone(),
            inputs: failure
                .executed()
                .then(|| named(variables, &failure.inputs)),
        }
    }
}

/// One successful trial's inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Trial index.
    pub trial_index: usize,
    /// Variable name to sampled value.
    pub inputs: IndexMap<String, f64>,
    /// Output name to value.
    pub outputs: IndexMap<String, f64>,
}

impl Sample {
    pub(crate) fn from_result(result: &TrialResult, variables: &[String], outputs: &[String]) -> Self {
        Self {
            trial_index: result.index,
            inputs: named(variables, &result.inputs),
            outputs: named(outputs, &result.outputs),
        }
    }
}

fn named(names: &[String], values: &[f64]) -> IndexMap<String, f64> {
    names.iter().cloned().zip(values.iter().copied()).collect()
}

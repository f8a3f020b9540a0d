//! Trial execution.
//!
//! Each trial owns the generator stream for its index, draws its inputs in
//! variable order, and evaluates the model. A failing trial is recorded and
//! never aborts the run.

use std::time::Instant;

use tracing::debug;

use crate::engine::pool::WorkerPool;
use crate::engine::rng::StreamFactory;

use super::request::ValidatedRequest;

/// A successful trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    /// Trial index.
    pub index: usize,
    /// Sampled inputs in variable order.
    pub inputs: Vec<f64>,
    /// Model outputs in output order.
    pub outputs: Vec<f64>,
}

/// A trial that failed or never ran.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialFailure {
    /// Trial index.
    pub index: usize,
    /// Why it failed.
    pub message: String,
    /// Inputs that triggered the failure; empty if the trial never ran.
    pub inputs: Vec<f64>,
}

impl TrialFailure {
    /// Whether the trial actually executed.
    #[must_use]
    pub fn executed(&self) -> bool {
        !self.inputs.is_empty()
    }
}

/// Result of one trial.
pub type TrialOutcome = Result<TrialResult, TrialFailure>;

/// Every outcome of a run, indexed by trial.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// One entry per requested trial, in index order.
    pub outcomes: Vec<TrialOutcome>,
    /// Trials that ran (succeeded or failed during evaluation).
    pub executed: usize,
    /// Whether the deadline stopped the run early.
    pub timed_out: bool,
}

impl RunOutput {
    /// Successful trial count.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Trials that ran and failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.executed - self.succeeded()
    }
}

/// Message recorded for trials skipped after the deadline.
pub const NOT_EXECUTED: &str = "not executed: deadline exceeded";

/// Runs trials on a [`WorkerPool`].
#[derive(Debug, Clone, Default)]
pub struct TrialRunner {
    pool: WorkerPool,
}

impl TrialRunner {
    /// Create a runner over the given pool.
    #[must_use]
    pub const fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Worker pool in use.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run every trial of `request`.
    pub fn run(
        &self,
        request: &ValidatedRequest,
        streams: &dyn StreamFactory,
        deadline: Option<Instant>,
    ) -> RunOutput {
        debug!(
            trials = request.trials,
            workers = self.pool.num_workers(),
            chunk_size = self.pool.get_chunk_size(),
            "dispatching trials"
        );

        let run = self
            .pool
            .execute(request.trials, deadline, |index| run_trial(request, streams, index));
        let executed = run.executed();

        let outcomes = run
            .results
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    Err(TrialFailure {
                        index,
                        message: NOT_EXECUTED.to_string(),
                        inputs: Vec::new(),
                    })
                })
            })
            .collect();

        RunOutput {
            outcomes,
            executed,
            timed_out: run.deadline_hit,
        }
    }
}

fn run_trial(request: &ValidatedRequest, streams: &dyn StreamFactory, index: usize) -> TrialOutcome {
    let mut rng = streams.stream(index);
    let inputs: Vec<f64> = request
        .distributions
        .iter()
        .map(|d| d.sample(&mut rng))
        .collect();

    match request.model.evaluate(&inputs) {
        Ok(outputs) => Ok(TrialResult {
            index,
            inputs,
            outputs,
        }),
        Err(e) => Err(TrialFailure {
            index,
            message: e.to_string(),
            inputs,
        }),
    }
}

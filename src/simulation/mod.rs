//! Simulation orchestration.
//!
//! A run moves through `Received → Validated → Running → Aggregating →
//! Completed`, or to `Failed` from any of them. The [`Simulator`] owns the
//! configuration and worker pool and is shared by every request; nothing
//! else is retained between runs.
//!
//! # Example
//!
//! ```rust
//! use mcsim::prelude::*;
//!
//! let request: SimulationRequest = serde_json::from_str(r#"{
//!     "trials": 1000,
//!     "seed": 42,
//!     "variables": [
//!         {"name": "x", "distribution": "uniform", "params": {"low": 0, "high": 1}}
//!     ],
//!     "model": "identity"
//! }"#).unwrap();
//!
//! let simulator = Simulator::new(ServiceConfig::default());
//! let response = simulator.run(&request).unwrap();
//! assert!((response.outputs["result"].mean - 0.5).abs() < 0.05);
//! ```

pub mod aggregate;
pub mod request;
pub mod response;
pub mod runner;

use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info, info_span, warn};

use crate::config::ServiceConfig;
use crate::engine::pool::WorkerPool;
use crate::engine::rng::{SeededStreams, StreamFactory};
use crate::error::{SimError, SimResult};

pub use aggregate::{Aggregator, HistogramBin, OutputSummary};
pub use request::{SimulationRequest, ValidatedRequest, VariableSpec};
pub use response::{Sample, SimulationResponse, TrialError};
pub use runner::{RunOutput, TrialFailure, TrialOutcome, TrialResult, TrialRunner};

/// Lifecycle of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Request accepted, not yet checked.
    Received,
    /// Request validated and compiled.
    Validated,
    /// Trials executing.
    Running,
    /// Reducing outcomes.
    Aggregating,
    /// Response built.
    Completed,
    /// Stopped with an error.
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Validated)
                | (Self::Validated, Self::Running)
                | (Self::Running, Self::Aggregating)
                | (Self::Aggregating, Self::Completed)
                | (
                    Self::Received | Self::Validated | Self::Running | Self::Aggregating,
                    Self::Failed
                )
        )
    }

    /// No further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Running => "running",
            Self::Aggregating => "aggregating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct RunTracker {
    state: RunState,
}

impl RunTracker {
    const fn new() -> Self {
        Self {
            state: RunState::Received,
        }
    }

    fn advance(&mut self, next: RunState) {
        if self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "run state");
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "ignoring illegal run state transition");
        }
    }

    fn fail(&mut self, err: SimError) -> SimError {
        if err.is_client_error() {
            debug!(error = %err, "request rejected");
        } else {
            warn!(stage = %err.stage(), kind = err.kind(), error = %err, "simulation failed");
        }
        self.advance(RunState::Failed);
        err
    }
}

/// Validates requests, runs trials and shapes responses.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: ServiceConfig,
    runner: TrialRunner,
}

impl Simulator {
    /// Build a simulator with a worker pool sized from `config`.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let pool = config
            .runner
            .workers
            .map_or_else(WorkerPool::new, WorkerPool::with_workers)
            .chunk_size(config.runner.chunk_size);
        Self {
            config,
            runner: TrialRunner::new(pool),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Worker threads used per run.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.runner.pool().num_workers()
    }

    /// Run a simulation with PCG streams derived from the request seed, or a
    /// fresh seed when the request has none.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad request, or
    /// [`SimError::NoValidTrials`], [`SimError::ExcessiveFailure`] or
    /// [`SimError::Timeout`] when the run cannot produce a valid summary.
    pub fn run(&self, request: &SimulationRequest) -> SimResult<SimulationResponse> {
        self.run_with_streams(request, SeededStreams::new)
    }

    /// Run a simulation with generator streams built by `make_streams`.
    ///
    /// `make_streams` receives the master seed and is called only after the
    /// request has passed validation.
    ///
    /// # Errors
    ///
    /// Same as [`Simulator::run`].
    pub fn run_with_streams<F, M>(
        &self,
        request: &SimulationRequest,
        make_streams: M,
    ) -> SimResult<SimulationResponse>
    where
        F: StreamFactory,
        M: FnOnce(u64) -> F,
    {
        let started = Instant::now();
        let mut tracker = RunTracker::new();

        let validated = request
            .validate(&self.config)
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(RunState::Validated);

        let seed = validated.seed.unwrap_or_else(rand::random);
        let streams = make_streams(seed);

        let span = info_span!("simulate", seed, trials = validated.trials);
        let _enter = span.enter();
        info!(
            variables = validated.variable_names.len(),
            outputs = validated.model.output_names().len(),
            workers = self.workers(),
            "simulation started"
        );

        tracker.advance(RunState::Running);
        let deadline = started + validated.timeout;
        let run = self.runner.run(&validated, &streams, Some(deadline));
        self.check_run(&validated, &run, started)
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(RunState::Aggregating);
        let outputs = Aggregator::new(validated.percentiles.clone(), validated.histogram_bins)
            .aggregate(validated.model.output_names(), &run.outcomes)
            .map_err(|e| tracker.fail(e))?;

        let response = self.respond(validated, run, seed, outputs, started);
        tracker.advance(RunState::Completed);
        info!(
            succeeded = response.trials_succeeded,
            failed = response.errors.len(),
            timed_out = response.timed_out,
            elapsed_ms = response.elapsed_ms,
            "simulation completed"
        );
        Ok(response)
    }

    /// Decide whether the outcomes support a summary.
    fn check_run(&self, request: &ValidatedRequest, run: &RunOutput, started: Instant) -> SimResult<()> {
        let succeeded = run.succeeded();
        let max_ratio = self.config.runner.max_failure_ratio;

        if succeeded == 0 {
            if run.timed_out && run.executed == 0 {
                return Err(SimError::Timeout {
                    elapsed_ms: elapsed_ms(started),
                    succeeded: 0,
                    required: required_successes(request.trials, max_ratio),
                });
            }
            return Err(SimError::NoValidTrials {
                attempted: request.trials,
            });
        }

        let failed = run.failed();
        if failed as f64 / run.executed as f64 > max_ratio {
            return Err(SimError::ExcessiveFailure {
                failed,
                executed: run.executed,
                max_ratio,
            });
        }

        if run.timed_out {
            let required = required_successes(request.trials, max_ratio);
            if succeeded < required {
                return Err(SimError::Timeout {
                    elapsed_ms: elapsed_ms(started),
                    succeeded,
                    required,
                });
            }
        }
        Ok(())
    }

    fn respond(
        &self,
        request: ValidatedRequest,
        run: RunOutput,
        seed: u64,
        outputs: IndexMap<String, OutputSummary>,
        started: Instant,
    ) -> SimulationResponse {
        let succeeded = run.succeeded();
        let failed = run.failed();
        let mut warnings = request.warnings;

        if failed > 0 {
            warnings.push(format!(
                "{failed} of {} executed trials failed during evaluation",
                run.executed
            ));
        }
        if run.timed_out {
            warn!(executed = run.executed, trials = request.trials, "deadline reached");
            warnings.push(format!(
                "deadline reached after {} of {} trials; statistics cover {succeeded} successful trials",
                run.executed, request.trials
            ));
        }

        let errors = run
            .outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .map(|f| TrialError::from_failure(f, &request.variable_names))
            .collect();

        let samples = request.include_samples.then(|| {
            let limit = self.config.limits.max_raw_samples;
            if succeeded > limit {
                warnings.push(format!(
                    "samples truncated to the first {limit} of {succeeded} successful trials"
                ));
            }
            run.outcomes
                .iter()
                .filter_map(|o| o.as_ref().ok())
                .take(limit)
                .map(|r| {
                    Sample::from_result(r, &request.variable_names, request.model.output_names())
                })
                .collect()
        });

        SimulationResponse {
            trials_requested: request.trials,
            trials_succeeded: succeeded,
            seed_used: seed,
            outputs,
            errors,
            warnings,
            timed_out: run.timed_out,
            elapsed_ms: elapsed_ms(started),
            samples,
        }
    }
}

/// Minimum successes for a timed-out run to still be summarized.
#[must_use]
pub fn required_successes(trials: usize, max_failure_ratio: f64) -> usize {
    let required = ((1.0 - max_failure_ratio) * trials as f64).ceil() as usize;
    required.clamp(1, trials.max(1))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Identical request and seed give identical statistics.
        #[test]
        fn prop_reproducible(seed in any::<u64>(), trials in 1u64..400) {
            let req: SimulationRequest = serde_json::from_value(json!({
                "trials": trials,
                "seed": seed,
                "variables": [
                    {"name": "a", "distribution": "normal", "params": {"mean": 0, "stddev": 1}},
                    {"name": "b", "distribution": "exponential", "params": {"rate": 2}}
                ],
                "model": "a * b + ln(b)"
            })).unwrap();
            let sim = Simulator::new(ServiceConfig::default());
            let first = sim.run(&req);
            let second = sim.run(&req);
            match (first, second) {
                (Ok(x), Ok(y)) => {
                    prop_assert_eq!(x.outputs, y.outputs);
                    prop_assert_eq!(x.errors, y.errors);
                }
                (Err(x), Err(y)) => prop_assert_eq!(x.kind(), y.kind()),
                _ => prop_assert!(false, "runs disagreed"),
            }
        }

        /// Succeeded trials plus reported errors equal requested trials.
        #[test]
        fn prop_count_law(seed in any::<u64>(), trials in 1u64..300) {
            let req: SimulationRequest = serde_json::from_value(json!({
                "trials": trials,
                "seed": seed,
                "variables": [
                    {"name": "x", "distribution": "uniform", "params": {"low": -0.5, "high": 4}}
                ],
                "model": "sqrt(x)"
            })).unwrap();
            let config = ServiceConfig::builder().max_failure_ratio(1.0).build();
            if let Ok(resp) = Simulator::new(config).run(&req) {
                prop_assert_eq!(resp.trials_succeeded + resp.errors.len(), resp.trials_requested);
                prop_assert_eq!(resp.outputs["result"].count, resp.trials_succeeded);
            }
        }
    }
}

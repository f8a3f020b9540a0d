//! # mcsim
//!
//! Reproducible Monte Carlo simulation service.
//!
//! A request names input variables bound to probability distributions and
//! a model that maps sampled inputs to outputs. The service runs the trials
//! on a work-stealing pool, each trial on its own PCG stream, and returns
//! summary statistics that are bit-identical for a given seed regardless of
//! worker count.
//!
//! ## Example
//!
//! ```rust
//! use mcsim::prelude::*;
//!
//! let config = ServiceConfig::builder()
//!     .max_trials(10_000)
//!     .workers(2)
//!     .build();
//! let simulator = Simulator::new(config);
//! assert_eq!(simulator.workers(), 2);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,
    clippy::imprecise_flops,
    clippy::missing_const_for_fn,
    clippy::float_cmp,
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod server;
pub mod simulation;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string served at `GET /`, including the git revision when the
/// build had one.
#[must_use]
pub fn version_string() -> String {
    match option_env!("GIT_HASH").filter(|h| !h.is_empty()) {
        Some(hash) => format!("mcsim {VERSION} ({})", &hash[..hash.len().min(12)]),
        None => format!("mcsim {VERSION}"),
    }
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ServiceConfig, ServiceConfigBuilder};
    pub use crate::engine::rng::{SeededStreams, SimRng, StreamFactory};
    pub use crate::error::{SimError, SimResult, Stage};
    pub use crate::model::{DistributionSpec, ModelSpec};
    pub use crate::simulation::{
        OutputSummary, SimulationRequest, SimulationResponse, Simulator, TrialError,
    };
}

/// Re-export for public API
pub use error::{SimError, SimResult};

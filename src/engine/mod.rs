//! Execution engine.
//!
//! - Deterministic RNG (PCG with one independent stream per trial)
//! - Bounded work-stealing pool for embarrassingly parallel trials

pub mod pool;
pub mod rng;

pub use pool::{PoolRun, TaskChunk, WorkerPool};
pub use rng::{SeededStreams, SimRng, StreamFactory};

//! HTTP service.
//!
//! Five GET routes serve version, health and documentation text; `POST
//! /simulate` runs a simulation on tokio's blocking pool so trial workers
//! never stall the async executor. At most `runner.max_concurrent_runs`
//! simulations hold a worker pool at once; the rest wait for a permit.

pub mod docs;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServiceConfig;
use crate::error::SimResult;
use crate::simulation::Simulator;

pub use handlers::{ApiError, ErrorBody, ErrorDetail};

/// Shared state for every request.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Active configuration.
    pub config: Arc<ServiceConfig>,
    /// Shared simulator.
    pub simulator: Arc<Simulator>,
    /// One permit per simulation allowed to run.
    pub permits: Arc<Semaphore>,
}

impl AppState {
    /// Build state from a configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let simulator = Arc::new(Simulator::new(config.clone()));
        let permits = Arc::new(Semaphore::new(config.runner.max_concurrent_runs));
        Self {
            config: Arc::new(config),
            simulator,
            permits,
        }
    }
}

/// Route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::version))
        .route("/health", get(handlers::health))
        .route("/docs", get(handlers::docs))
        .route("/help", get(handlers::help))
        .route("/help/interpret", get(handlers::help_interpret))
        .route("/help/examples", get(handlers::help_examples))
        .route("/help/constraints", get(handlers::help_constraints))
        .route("/simulate", post(handlers::simulate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`crate::SimError::Io`] if the server fails.
pub async fn serve_on<F>(listener: TcpListener, config: ServiceConfig, shutdown: F) -> SimResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(config);
    info!(
        addr = %listener.local_addr()?,
        workers = state.simulator.workers(),
        max_trials = state.config.limits.max_trials,
        max_concurrent_runs = state.config.runner.max_concurrent_runs,
        "mcsim listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}

/// Bind the configured address and serve until Ctrl-C.
///
/// # Errors
///
/// Returns [`crate::SimError::Io`] if binding or serving fails.
pub async fn serve(config: ServiceConfig) -> SimResult<()> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    serve_on(listener, config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available; run until the process is killed
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

//! Route handlers and the HTTP error mapping.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{SimError, Stage};
use crate::simulation::{SimulationRequest, SimulationResponse};

use super::{docs, AppState};

/// A [`SimError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub SimError);

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            SimError::Validation { .. } | SimError::InvalidDistribution { .. } => {
                StatusCode::BAD_REQUEST
            }
            SimError::ExcessiveFailure { .. }
            | SimError::NoValidTrials { .. }
            | SimError::NonFiniteStatistic { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SimError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for the wrapped error.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind().to_string(),
                stage: self.0.stage(),
                message: self.0.to_string(),
                field: self.0.field(),
            },
        }
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SimError::validation("body", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            error!(error = %self.0, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

/// `{"error": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error details returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable kind, e.g. `validation_error`.
    pub kind: String,
    /// Run stage the error belongs to.
    pub stage: Stage,
    /// Human-readable description.
    pub message: String,
    /// Offending request field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// `POST /simulate`
pub async fn simulate(
    State(state): State<AppState>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<Json<SimulationResponse>, ApiError> {
    let Json(request) = payload?;
    let simulator = Arc::clone(&state.simulator);

    if state.permits.available_permits() == 0 {
        debug!("all run slots busy, queueing request");
    }
    let permit = Arc::clone(&state.permits)
        .acquire_owned()
        .await
        .map_err(|e| SimError::internal(format!("run slots closed: {e}")))?;

    let response = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        simulator.run(&request)
    })
        .await
        .map_err(|e| SimError::internal(format!("simulation task failed: {e}")))??;

    Ok(Json(response))
}

/// `GET /`
pub async fn version() -> String {
    crate::version_string()
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /docs`
pub async fn docs() -> &'static str {
    docs::DOCS
}

/// `GET /help`
pub async fn help() -> &'static str {
    docs::HELP
}

/// `GET /help/interpret`
pub async fn help_interpret() -> &'static str {
    docs::INTERPRET
}

/// `GET /help/examples`
pub async fn help_examples() -> &'static str {
    docs::EXAMPLES
}

/// `GET /help/constraints`
pub async fn help_constraints(State(state): State<AppState>) -> String {
    docs::constraints(&state.config)
}

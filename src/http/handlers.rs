//! Public API handlers.

use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::SolveError;
use crate::http::server::AppState;
use crate::orchestrator::{ResultEnvelope, SolveOptions, StatusReport};

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    pub problem: String,
    pub persona: String,
    /// Relative deadline in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

fn request_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

pub async fn solve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SolveRequest>,
) -> Result<Json<ResultEnvelope>, ApiError> {
    if body.problem.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "problem must not be empty"));
    }
    if body.persona.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "persona must not be empty"));
    }

    let options = SolveOptions {
        deadline: body
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms)),
        request_id: request_id(&headers),
        ..SolveOptions::default()
    };

    match state
        .orchestrator
        .solve_with(&body.problem, &body.persona, options)
        .await
    {
        Ok(envelope) => Ok(Json(envelope)),
        Err(e @ SolveError::Cancelled) => Err(api_error(StatusCode::GATEWAY_TIMEOUT, e.to_string())),
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.orchestrator.status())
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

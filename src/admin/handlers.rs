use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::learning::AttemptRecord;
use crate::orchestrator::StatusReport;

const DEFAULT_ATTEMPT_LIMIT: usize = 50;

pub async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.orchestrator.status())
}

#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    pub limit: Option<usize>,
}

pub async fn get_attempts(
    State(state): State<AppState>,
    Query(query): Query<AttemptQuery>,
) -> Json<Vec<AttemptRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_ATTEMPT_LIMIT);
    Json(state.orchestrator.recorder().recent(limit))
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub half_opened: Vec<String>,
}

pub async fn post_sweep(State(state): State<AppState>) -> Json<SweepResult> {
    Json(SweepResult {
        half_opened: state.orchestrator.sweep_circuits(),
    })
}

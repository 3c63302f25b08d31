use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{list_limit, AppState};
use crate::api::error::{ApiError, ApiJson, ApiQuery};
use crate::monitoring::{window_secs, PerformanceSummary, RequestSample, SystemSnapshot};

#[derive(Deserialize)]
pub struct WindowParams {
    pub window_secs: Option<u64>,
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<WindowParams>,
) -> Result<Json<PerformanceSummary>, ApiError> {
    let summary = state.monitor.summary(window_secs(params.window_secs)?);
    Ok(Json(summary.as_ref().clone()))
}

#[derive(Deserialize)]
pub struct SamplesParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SamplesResponse {
    pub data: Vec<RequestSample>,
    pub total: usize,
}

pub async fn list_samples(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<SamplesParams>,
) -> Json<SamplesResponse> {
    Json(SamplesResponse {
        data: state.monitor.samples(list_limit(params.limit)),
        total: state.monitor.sample_count(),
    })
}

/// Accept a sample measured elsewhere, e.g. by the dashboard frontend
pub async fn record_sample(
    State(state): State<Arc<AppState>>,
    ApiJson(sample): ApiJson<RequestSample>,
) -> Result<StatusCode, ApiError> {
    if sample.endpoint.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing required field: endpoint".to_string()));
    }
    if !sample.duration_ms.is_finite() || sample.duration_ms < 0.0 {
        return Err(ApiError::BadRequest(
            "Invalid duration_ms: must be a non-negative number".to_string(),
        ));
    }
    state.monitor.record(sample);
    Ok(StatusCode::CREATED)
}

pub async fn reset_samples(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state.monitor.reset();
    Json(serde_json::json!({ "cleared": cleared }))
}

pub async fn system(State(state): State<Arc<AppState>>) -> Json<SystemSnapshot> {
    Json(state.monitor.system_snapshot())
}

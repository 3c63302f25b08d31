use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{list_limit, AppState};
use crate::api::error::{ApiError, ApiQuery};
use crate::bottleneck::BottleneckReport;
use crate::monitoring::window_secs;

#[derive(Deserialize)]
pub struct AnalyzeParams {
    pub window_secs: Option<u64>,
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<AnalyzeParams>,
) -> Result<Json<BottleneckReport>, ApiError> {
    let summary = state.monitor.summary(window_secs(params.window_secs)?);
    Ok(Json(state.bottlenecks.analyze(&summary)))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub data: Vec<BottleneckReport>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        data: state.bottlenecks.history(list_limit(params.limit)),
    })
}

pub async fn latest(State(state): State<Arc<AppState>>) -> Result<Json<BottleneckReport>, ApiError> {
    state
        .bottlenecks
        .latest()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No bottleneck analysis has run yet".to_string()))
}

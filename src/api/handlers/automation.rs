use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery};
use crate::automation::{ExecutionFilter, ExecutionPage, ExecutionStats};
use crate::data::{AutomationExecution, NewExecution};

pub async fn create_execution(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<NewExecution>,
) -> Result<(StatusCode, Json<AutomationExecution>), ApiError> {
    let execution = state.automation.create(input)?;
    Ok((StatusCode::CREATED, Json(execution)))
}

pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<ExecutionFilter>,
) -> Json<ExecutionPage> {
    Json(state.automation.list(&filter))
}

#[derive(Deserialize)]
pub struct StatsParams {
    pub automation_id: Option<String>,
}

pub async fn execution_stats(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<StatsParams>,
) -> Json<ExecutionStats> {
    Json(state.automation.stats(params.automation_id.as_deref()))
}

pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationExecution>, ApiError> {
    Ok(Json(state.automation.get(&parse_id(&id)?)?))
}

pub async fn start_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationExecution>, ApiError> {
    Ok(Json(state.automation.start(&parse_id(&id)?)?))
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    pub output: Option<serde_json::Value>,
}

pub async fn complete_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<ApiJson<CompleteRequest>>,
) -> Result<Json<AutomationExecution>, ApiError> {
    let output = body.and_then(|ApiJson(b)| b.output);
    Ok(Json(state.automation.complete(&parse_id(&id)?, output)?))
}

#[derive(Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub error: String,
}

pub async fn fail_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<FailRequest>,
) -> Result<Json<AutomationExecution>, ApiError> {
    Ok(Json(state.automation.fail(&parse_id(&id)?, request.error)?))
}

pub async fn cancel_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationExecution>, ApiError> {
    Ok(Json(state.automation.cancel(&parse_id(&id)?)?))
}

pub async fn retry_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationExecution>, ApiError> {
    Ok(Json(state.automation.retry(&parse_id(&id)?)?))
}

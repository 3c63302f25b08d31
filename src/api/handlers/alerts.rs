use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::alerts::{AlertFilter, AlertRule, AlertRuleInput, PerformanceAlert};
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery};

#[derive(Serialize)]
pub struct AlertsResponse {
    pub data: Vec<PerformanceAlert>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<AlertFilter>,
) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        data: state.alert_manager().alerts(&filter),
    })
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    let id = parse_id(&id)?;
    state
        .alert_manager()
        .alert(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Alert not found: {}", id)))
}

#[derive(Deserialize, Default)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: Option<String>,
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<ApiJson<AcknowledgeRequest>>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    let by = body.and_then(|ApiJson(b)| b.acknowledged_by);
    Ok(Json(state.alert_manager().acknowledge(&parse_id(&id)?, by)?))
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    Ok(Json(state.alert_manager().resolve(&parse_id(&id)?)?))
}

pub async fn dismiss_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    Ok(Json(state.alert_manager().dismiss(&parse_id(&id)?)?))
}

#[derive(Serialize)]
pub struct RulesResponse {
    pub data: Vec<AlertRule>,
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        data: state.alert_manager().rules(),
    })
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<AlertRuleInput>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    let rule = state.alert_manager().create_rule(input)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AlertRuleInput>,
) -> Result<Json<AlertRule>, ApiError> {
    Ok(Json(state.alert_manager().update_rule(&parse_id(&id)?, input)?))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rule = state.alert_manager().delete_rule(&parse_id(&id)?)?;
    Ok(Json(serde_json::json!({ "deleted": rule.id })))
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub fired: Vec<PerformanceAlert>,
}

/// Evaluate every rule now instead of waiting for the checker
pub async fn evaluate(State(state): State<Arc<AppState>>) -> Json<EvaluateResponse> {
    Json(EvaluateResponse {
        fired: state.alerts.check_once().await,
    })
}

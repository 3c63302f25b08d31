use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery};
use crate::data::{Metric, NewMetric};
use crate::metrics::{BatchResult, MetricPage, MetricQuery, MetricSummary, SeriesPoint};

pub async fn record_metric(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<NewMetric>,
) -> Result<(StatusCode, Json<Metric>), ApiError> {
    let metric = state.metrics.record(input)?;
    Ok((StatusCode::CREATED, Json(metric)))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub metrics: Vec<NewMetric>,
}

pub async fn record_batch(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    if request.metrics.is_empty() {
        return Err(ApiError::BadRequest("metrics must not be empty".to_string()));
    }
    Ok(Json(state.metrics.record_batch(request.metrics)))
}

pub async fn list_metrics(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MetricQuery>,
) -> Json<MetricPage> {
    Json(state.metrics.query(&query))
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub data: Vec<MetricSummary>,
}

pub async fn metric_summary(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MetricQuery>,
) -> Json<SummaryResponse> {
    Json(SummaryResponse {
        data: state.metrics.summary(&query),
    })
}

#[derive(Deserialize)]
pub struct SeriesParams {
    pub name: Option<String>,
    pub bucket_secs: Option<i64>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct SeriesResponse {
    pub name: String,
    pub bucket_secs: i64,
    pub points: Vec<SeriesPoint>,
}

pub async fn metric_series(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<SeriesParams>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let name = params
        .name
        .ok_or_else(|| ApiError::BadRequest("Missing required field: name".to_string()))?;
    let bucket_secs = params.bucket_secs.unwrap_or(3600);
    let query = MetricQuery {
        entity_type: params.entity_type,
        entity_id: params.entity_id,
        since: params.since,
        until: params.until,
        ..Default::default()
    };

    let points = state.metrics.series(&name, bucket_secs, &query)?;
    Ok(Json(SeriesResponse {
        name,
        bucket_secs,
        points,
    }))
}

pub async fn get_metric(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Metric>, ApiError> {
    Ok(Json(state.metrics.get(&parse_id(&id)?)?))
}

pub async fn delete_metric(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let metric = state.metrics.delete(&parse_id(&id)?)?;
    Ok(Json(serde_json::json!({ "deleted": metric.id })))
}

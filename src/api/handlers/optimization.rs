use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{list_limit, AppState};
use crate::api::error::{ApiError, ApiQuery};
use crate::monitoring::DEFAULT_WINDOW_SECS;
use crate::optimization::{
    catalog, OptimizationArea, OptimizationDefinition, OptimizationExecution, Recommendation,
};

#[derive(Deserialize)]
pub struct CatalogParams {
    pub area: Option<OptimizationArea>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub data: Vec<&'static OptimizationDefinition>,
}

pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<CatalogParams>,
) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        data: state.optimizations.catalog(params.area),
    })
}

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub health_score: u32,
    pub data: Vec<Recommendation>,
}

/// Recommendations for the current window; the analysis is not stored in history
pub async fn recommendations(State(state): State<Arc<AppState>>) -> Json<RecommendationsResponse> {
    let summary = state.monitor.summary(DEFAULT_WINDOW_SECS);
    let report = state.bottlenecks.inspect(&summary);
    Json(RecommendationsResponse {
        health_score: report.health_score,
        data: state.optimizations.recommendations(&report),
    })
}

#[derive(Deserialize)]
pub struct ExecuteParams {
    pub seed: Option<u64>,
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<ExecuteParams>,
) -> Result<Json<OptimizationExecution>, ApiError> {
    Ok(Json(state.optimizations.execute(&id, params.seed).await?))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub area: Option<OptimizationArea>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub data: Vec<OptimizationExecution>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        data: state
            .optimizations
            .history(params.area, list_limit(params.limit)),
    })
}

/// Catalog, execute and history restricted to one area
pub fn area_routes(area: OptimizationArea) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(move |state: State<Arc<AppState>>| async move {
                list_catalog(state, ApiQuery(CatalogParams { area: Some(area) })).await
            }),
        )
        .route(
            "/:id/execute",
            post(
                move |state: State<Arc<AppState>>,
                      Path(id): Path<String>,
                      params: ApiQuery<ExecuteParams>| async move {
                    match catalog::find(&id) {
                        Some(def) if def.area == area => execute(state, Path(id), params).await,
                        _ => Err(ApiError::NotFound(format!(
                            "No {} optimization named {}",
                            area, id
                        ))),
                    }
                },
            ),
        )
        .route(
            "/history",
            get(
                move |state: State<Arc<AppState>>, ApiQuery(params): ApiQuery<HistoryParams>| async move {
                    history(
                        state,
                        ApiQuery(HistoryParams {
                            area: Some(area),
                            limit: params.limit,
                        }),
                    )
                    .await
                },
            ),
        )
}

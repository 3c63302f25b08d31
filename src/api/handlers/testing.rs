use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{list_limit, AppState};
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery};
use crate::testing::{
    LoadTestConfig, MemoryTestConfig, StressTestConfig, TestJob, TestKind, TestRun,
};

#[derive(Deserialize)]
pub struct RunParams {
    /// Respond with the finished run instead of the running one
    #[serde(default)]
    pub wait: bool,
}

async fn submit(
    state: &Arc<AppState>,
    job: TestJob,
    wait: bool,
) -> Result<(StatusCode, Json<TestRun>), ApiError> {
    if wait {
        let run = state.tests.run(job).await?;
        Ok((StatusCode::OK, Json(run)))
    } else {
        let run = state.tests.start(job)?;
        Ok((StatusCode::ACCEPTED, Json(run)))
    }
}

pub async fn load_test(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<RunParams>,
    ApiJson(config): ApiJson<LoadTestConfig>,
) -> Result<(StatusCode, Json<TestRun>), ApiError> {
    submit(&state, TestJob::Load(config), params.wait).await
}

pub async fn stress_test(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<RunParams>,
    ApiJson(config): ApiJson<StressTestConfig>,
) -> Result<(StatusCode, Json<TestRun>), ApiError> {
    submit(&state, TestJob::Stress(config), params.wait).await
}

pub async fn memory_test(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<RunParams>,
    ApiJson(config): ApiJson<MemoryTestConfig>,
) -> Result<(StatusCode, Json<TestRun>), ApiError> {
    submit(&state, TestJob::Memory(config), params.wait).await
}

#[derive(Deserialize)]
pub struct ListParams {
    pub kind: Option<TestKind>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub data: Vec<TestRun>,
}

pub async fn list_tests(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Json<ListResponse> {
    Json(ListResponse {
        data: state.tests.list(params.kind, list_limit(params.limit)),
    })
}

pub async fn get_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TestRun>, ApiError> {
    Ok(Json(state.tests.get(&parse_id(&id)?)?))
}

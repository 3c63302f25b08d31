use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery};
use crate::data::DataArchive;
use crate::retention::{ArchiveFilter, RetentionReport};
use crate::storage::BackupMetadata;

#[derive(Deserialize, Default)]
pub struct CreateBackupRequest {
    pub label: Option<String>,
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    body: Option<ApiJson<CreateBackupRequest>>,
) -> Result<(StatusCode, Json<BackupMetadata>), ApiError> {
    let label = body.and_then(|ApiJson(b)| b.label);
    let metadata = state.backups.create(&state.repository, label)?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

#[derive(Serialize)]
pub struct BackupsResponse {
    pub data: Vec<BackupMetadata>,
}

pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BackupsResponse>, ApiError> {
    Ok(Json(BackupsResponse {
        data: state.backups.list()?,
    }))
}

pub async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BackupMetadata>, ApiError> {
    Ok(Json(state.backups.get(&id)?))
}

/// Replaces the live data with the backup's contents
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BackupMetadata>, ApiError> {
    Ok(Json(state.backups.restore(&state.repository, &id)?))
}

pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.backups.delete(&id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Serialize)]
pub struct ArchivesResponse {
    pub data: Vec<DataArchive>,
}

pub async fn list_archives(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<ArchiveFilter>,
) -> Json<ArchivesResponse> {
    Json(ArchivesResponse {
        data: state.retention.list_archives(&filter),
    })
}

pub async fn get_archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataArchive>, ApiError> {
    Ok(Json(state.retention.get_archive(&parse_id(&id)?)?))
}

pub async fn restore_archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataArchive>, ApiError> {
    Ok(Json(state.retention.restore_archive(&parse_id(&id)?)?))
}

pub async fn run_retention(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RetentionReport>, ApiError> {
    Ok(Json(state.retention.run(Utc::now())?))
}

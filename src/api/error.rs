use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::alerts::AlertError;
use crate::api::auth::AuthError;
use crate::automation::AutomationError;
use crate::data::ValidationError;
use crate::metrics::MetricError;
use crate::optimization::OptimizationError;
use crate::retention::RetentionError;
use crate::storage::BackupError;
use crate::testing::TestingError;

/// Error returned by every handler, rendered as `{"error": message}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    TooManyRequests(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<MetricError> for ApiError {
    fn from(e: MetricError) -> Self {
        match e {
            MetricError::Validation(_) => ApiError::BadRequest(e.to_string()),
            MetricError::NotFound(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

impl From<AutomationError> for ApiError {
    fn from(e: AutomationError) -> Self {
        match e {
            AutomationError::NotFound(_) => ApiError::NotFound(e.to_string()),
            AutomationError::Validation(_)
            | AutomationError::InvalidTransition { .. }
            | AutomationError::RetriesExhausted { .. } => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<RetentionError> for ApiError {
    fn from(e: RetentionError) -> Self {
        match e {
            RetentionError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RetentionError::Payload(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<BackupError> for ApiError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::NotFound(_) => ApiError::NotFound(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(e: AlertError) -> Self {
        match e {
            AlertError::RuleNotFound(_) | AlertError::AlertNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            AlertError::Validation(_) | AlertError::InvalidTransition { .. } => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

impl From<OptimizationError> for ApiError {
    fn from(e: OptimizationError) -> Self {
        match e {
            OptimizationError::NotFound(_) => ApiError::NotFound(e.to_string()),
            OptimizationError::AlreadyRunning(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<TestingError> for ApiError {
    fn from(e: TestingError) -> Self {
        match e {
            TestingError::Validation(_) => ApiError::BadRequest(e.to_string()),
            TestingError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TestingError::Aborted(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Token(_) => ApiError::Internal(e.to_string()),
            _ => ApiError::Unauthorized(e.to_string()),
        }
    }
}

/// `Json` whose rejections use the API error body and status 400
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections use the API error body
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid id: {}", raw)))
}

//! Per-IP rate limiting with tower_governor
//!
//! Requires the service to be served with
//! `into_make_service_with_connect_info::<SocketAddr>()` so the peer address
//! is available to [`PeerIpKeyExtractor`].

use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

use super::error::ApiError;

/// Config with `x-ratelimit-*` response headers
pub type HeaderGovernorConfig = GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request of quota
    pub per_second: u64,
    /// Requests allowed at once
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 100,
        }
    }
}

impl RateLimitConfig {
    /// `None` when the burst size is zero, which disables limiting
    pub fn governor_config(&self) -> Option<Arc<HeaderGovernorConfig>> {
        if self.burst_size == 0 {
            return None;
        }
        GovernorConfigBuilder::default()
            .per_second(self.per_second.max(1))
            .burst_size(self.burst_size)
            .use_headers()
            .error_handler(rejection_response)
            .finish()
            .map(Arc::new)
    }

    pub fn layer(&self) -> Option<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware>> {
        self.governor_config().map(|config| GovernorLayer { config })
    }
}

/// Limiter rejections as `{"error": ...}` bodies, keeping the limiter's headers
fn rejection_response(error: GovernorError) -> Response {
    let (mut response, headers) = match error {
        GovernorError::TooManyRequests { wait_time, headers } => (
            ApiError::TooManyRequests(format!("Too many requests, retry in {}s", wait_time))
                .into_response(),
            headers,
        ),
        GovernorError::UnableToExtractKey => (
            ApiError::Internal("Unable to determine client address".to_string()).into_response(),
            None,
        ),
        GovernorError::Other { code, msg, headers } => {
            let message = msg.unwrap_or_else(|| code.to_string());
            ((code, Json(serde_json::json!({ "error": message }))).into_response(), headers)
        }
    };
    if let Some(headers) = headers {
        response.headers_mut().extend(headers);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    #[test]
    fn test_zero_burst_disables() {
        let config = RateLimitConfig {
            per_second: 1,
            burst_size: 0,
        };
        assert!(config.governor_config().is_none());
        assert!(config.layer().is_none());
    }

    #[tokio::test]
    async fn test_rejection_is_json_with_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-after", HeaderValue::from_static("7"));
        let response = rejection_response(GovernorError::TooManyRequests {
            wait_time: 7,
            headers: Some(headers),
        });

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-after"], "7");
        assert_eq!(response.headers()["content-type"], "application/json");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Too many requests, retry in 7s");
    }

    #[test]
    fn test_create_governor_config() {
        assert!(RateLimitConfig::default().governor_config().is_some());
    }
}

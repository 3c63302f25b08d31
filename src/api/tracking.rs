use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use super::handlers::AppState;
use crate::monitoring::RequestSample;

/// Feed every handled request into the performance monitor
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    // Route templates keep per-endpoint stats from fragmenting on ids
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let _in_flight = state.monitor.begin_request();
    let started = Instant::now();
    let response = next.run(request).await;

    state.monitor.record(RequestSample {
        timestamp: Utc::now(),
        method,
        endpoint,
        status: response.status().as_u16(),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
    });

    response
}

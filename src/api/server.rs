use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use governor::middleware::StateInformationMiddleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{issue_token, require_auth};
use super::handlers::{
    alerts, automation, backup, bottleneck, health_check, metrics, monitoring, optimization,
    testing, AppState,
};
use super::rate_limit::RateLimitConfig;
use super::tracking::track_requests;
use crate::config::ServerConfig;
use crate::optimization::OptimizationArea;
use crate::retention::RetentionWorker;
use crate::storage::BackupWorker;

fn metric_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(metrics::record_metric).get(metrics::list_metrics))
        .route("/batch", post(metrics::record_batch))
        .route("/summary", get(metrics::metric_summary))
        .route("/series", get(metrics::metric_series))
        .route("/:id", get(metrics::get_metric).delete(metrics::delete_metric))
}

fn automation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/executions",
            post(automation::create_execution).get(automation::list_executions),
        )
        .route("/executions/stats", get(automation::execution_stats))
        .route("/executions/:id", get(automation::get_execution))
        .route("/executions/:id/start", post(automation::start_execution))
        .route("/executions/:id/complete", post(automation::complete_execution))
        .route("/executions/:id/fail", post(automation::fail_execution))
        .route("/executions/:id/cancel", post(automation::cancel_execution))
        .route("/executions/:id/retry", post(automation::retry_execution))
}

fn monitoring_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/summary", get(monitoring::summary))
        .route(
            "/samples",
            get(monitoring::list_samples)
                .post(monitoring::record_sample)
                .delete(monitoring::reset_samples),
        )
        .route("/system", get(monitoring::system))
}

fn alert_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/:id", get(alerts::get_alert))
        .route("/alerts/:id/acknowledge", post(alerts::acknowledge_alert))
        .route("/alerts/:id/resolve", post(alerts::resolve_alert))
        .route("/alerts/:id/dismiss", post(alerts::dismiss_alert))
        .route("/rules", get(alerts::list_rules).post(alerts::create_rule))
        .route("/rules/:id", put(alerts::update_rule).delete(alerts::delete_rule))
        .route("/evaluate", post(alerts::evaluate))
}

fn bottleneck_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", get(bottleneck::analyze))
        .route("/history", get(bottleneck::history))
        .route("/latest", get(bottleneck::latest))
}

fn optimization_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/catalog", get(optimization::list_catalog))
        .route("/recommendations", get(optimization::recommendations))
        .route("/:id/execute", post(optimization::execute))
        .route("/history", get(optimization::history))
}

fn testing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/load", post(testing::load_test))
        .route("/stress", post(testing::stress_test))
        .route("/memory", post(testing::memory_test))
        .route("/tests", get(testing::list_tests))
        .route("/tests/:id", get(testing::get_test))
}

fn backup_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(backup::create_backup).get(backup::list_backups))
        .route("/:id", get(backup::get_backup).delete(backup::delete_backup))
        .route("/:id/restore", post(backup::restore_backup))
        .route("/archives/list", get(backup::list_archives))
        .route("/archives/:id", get(backup::get_archive))
        .route("/archives/:id/restore", post(backup::restore_archive))
        .route("/retention/run", post(backup::run_retention))
}

/// Build the application router
///
/// Everything under `/api` except the token endpoint requires a bearer token
/// when auth is configured. Rate limiting keys on the peer address, so a
/// router built with a limiter must be served with connect info.
pub fn build_router(
    state: Arc<AppState>,
    rate_limit: Option<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware>>,
) -> Router {
    let protected = Router::new()
        .nest("/api/metrics", metric_routes())
        .nest("/api/automation", automation_routes())
        .nest("/api/performanceMonitoring", monitoring_routes())
        .nest("/api/performanceAlert", alert_routes())
        .nest("/api/performanceBottleneck", bottleneck_routes())
        .nest("/api/performanceOptimization", optimization_routes())
        .nest(
            "/api/apiOptimization",
            optimization::area_routes(OptimizationArea::Api),
        )
        .nest(
            "/api/databaseOptimization",
            optimization::area_routes(OptimizationArea::Database),
        )
        .nest(
            "/api/frontendOptimization",
            optimization::area_routes(OptimizationArea::Frontend),
        )
        .nest("/api/performanceTesting", testing_routes())
        .nest("/api/backup", backup_routes())
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/token", post(issue_token))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_requests,
        ));

    if let Some(governor) = rate_limit {
        router = router.layer(governor);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(&config)?);

    if config.auth_enabled() {
        tracing::info!("JWT authentication enabled");
    } else {
        tracing::warn!("PULSEBOARD_JWT_SECRET is not set; the API is unauthenticated");
    }

    // Start background workers
    let retention_worker = Arc::new(RetentionWorker::new(
        Arc::clone(&state.retention),
        config.retention_interval(),
    ));
    let retention_handle = Arc::clone(&retention_worker).start();

    let alert_handle = Arc::clone(&state.alerts).start(config.alert_interval());

    let backup_worker = config.backup_interval().map(|interval| {
        Arc::new(BackupWorker::new(
            Arc::clone(&state.backups),
            Arc::clone(&state.repository),
            interval,
            config.max_backups,
        ))
    });
    let backup_handle = backup_worker
        .as_ref()
        .map(|worker| Arc::clone(worker).start());

    let rate_limit = RateLimitConfig {
        per_second: config.rate_limit_per_second,
        burst_size: config.rate_limit_burst,
    };
    match rate_limit.burst_size {
        0 => tracing::info!("Rate limiting disabled"),
        burst => tracing::info!(
            "Rate limiting: burst {} per IP, one request replenished every {}s",
            burst,
            rate_limit.per_second
        ),
    }

    let app = build_router(Arc::clone(&state), rate_limit.layer());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Pulseboard server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(
        Arc::clone(&state),
        retention_worker,
        backup_worker,
    ))
    .await?;

    retention_handle.abort();
    alert_handle.abort();
    if let Some(handle) = backup_handle {
        handle.abort();
    }

    tracing::info!("Pulseboard server stopped");
    Ok(())
}

async fn shutdown_signal(
    state: Arc<AppState>,
    retention_worker: Arc<RetentionWorker>,
    backup_worker: Option<Arc<BackupWorker>>,
) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    retention_worker.stop();
    state.alerts.stop().await;
    if let Some(worker) = backup_worker {
        worker.stop();
    }
}

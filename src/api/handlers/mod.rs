//! Request handlers, one module per resource prefix

pub mod alerts;
pub mod automation;
pub mod backup;
pub mod bottleneck;
pub mod metrics;
pub mod monitoring;
pub mod optimization;
pub mod testing;

use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::auth::JwtAuth;
use crate::alerts::{AlertChecker, AlertManager, AlertRule};
use crate::automation::AutomationService;
use crate::bottleneck::BottleneckAnalyzer;
use crate::config::ServerConfig;
use crate::metrics::MetricService;
use crate::monitoring::{PerformanceMonitor, DEFAULT_WINDOW_SECS};
use crate::optimization::OptimizationService;
use crate::retention::RetentionService;
use crate::storage::{BackupError, BackupManager, Repository};
use crate::testing::TestRunner;

/// Application state shared across handlers
pub struct AppState {
    pub repository: Arc<Repository>,
    pub metrics: MetricService,
    pub automation: AutomationService,
    pub retention: Arc<RetentionService>,
    pub backups: Arc<BackupManager>,
    pub monitor: Arc<PerformanceMonitor>,
    pub alerts: Arc<AlertChecker>,
    pub bottlenecks: BottleneckAnalyzer,
    pub optimizations: OptimizationService,
    pub tests: Arc<TestRunner>,
    /// `None` when no JWT secret is configured
    pub auth: Option<Arc<JwtAuth>>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self, BackupError> {
        let repository = Arc::new(Repository::new());
        let monitor = Arc::new(PerformanceMonitor::new());
        let alert_manager = Arc::new(AlertManager::new(AlertRule::defaults()));

        let auth = config.jwt_secret.as_deref().map(|secret| {
            let auth = JwtAuth::new(secret, config.jwt_ttl_secs);
            let auth = match (&config.admin_user, &config.admin_password) {
                (Some(user), Some(password)) => auth.with_admin(user, password),
                _ => auth,
            };
            Arc::new(auth)
        });

        Ok(Self {
            metrics: MetricService::new(Arc::clone(&repository)),
            automation: AutomationService::new(Arc::clone(&repository)),
            retention: Arc::new(RetentionService::new(
                Arc::clone(&repository),
                config.retention_policy(),
            )),
            backups: Arc::new(BackupManager::open(&config.data_dir)?),
            alerts: Arc::new(AlertChecker::new(
                alert_manager,
                Arc::clone(&monitor),
                DEFAULT_WINDOW_SECS,
            )),
            bottlenecks: BottleneckAnalyzer::default(),
            optimizations: OptimizationService::with_duration_scale(
                Arc::clone(&monitor),
                config.simulation_time_scale,
            ),
            tests: Arc::new(TestRunner::new(config.simulation_time_scale)),
            monitor,
            repository,
            auth,
        })
    }

    pub fn alert_manager(&self) -> &AlertManager {
        self.alerts.manager()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Default and ceiling for list endpoints taking `?limit=`
pub(crate) fn list_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(50).clamp(1, 1000)
}

//! Optimization catalog, simulated execution and recommendations
//!
//! Executing an optimization changes nothing on the host. It waits for the
//! definition's duration and reports a projected p95 latency from a random
//! improvement within the definition's range.

pub mod catalog;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use catalog::{OptimizationArea, OptimizationDefinition, CATALOG};

use crate::bottleneck::BottleneckReport;
use crate::data::Severity;
use crate::monitoring::{PerformanceMonitor, DEFAULT_WINDOW_SECS};
use crate::stats::round2;

const EXECUTION_HISTORY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationExecution {
    pub id: Uuid,
    pub optimization_id: String,
    pub area: OptimizationArea,
    pub name: String,
    pub status: OptimizationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub baseline_p95_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_p95_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub optimization: &'static OptimizationDefinition,
    pub priority: Severity,
    pub reason: String,
}

pub struct OptimizationService {
    monitor: Arc<PerformanceMonitor>,
    /// Multiplier applied to each definition's duration
    duration_scale: f64,
    active: DashMap<&'static str, OptimizationExecution>,
    history: RwLock<VecDeque<OptimizationExecution>>,
}

impl OptimizationService {
    pub fn new(monitor: Arc<PerformanceMonitor>) -> Self {
        Self::with_duration_scale(monitor, 1.0)
    }

    pub fn with_duration_scale(monitor: Arc<PerformanceMonitor>, duration_scale: f64) -> Self {
        Self {
            monitor,
            duration_scale: duration_scale.max(0.0),
            active: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn catalog(&self, area: Option<OptimizationArea>) -> Vec<&'static OptimizationDefinition> {
        catalog::by_area(area)
    }

    /// Run an optimization to completion. `seed` fixes the improvement drawn.
    pub async fn execute(
        &self,
        optimization_id: &str,
        seed: Option<u64>,
    ) -> Result<OptimizationExecution, OptimizationError> {
        let def = catalog::find(optimization_id)
            .ok_or_else(|| OptimizationError::NotFound(optimization_id.to_string()))?;

        let baseline = self.monitor.summary(DEFAULT_WINDOW_SECS).response_time.p95;
        let mut execution = OptimizationExecution {
            id: Uuid::new_v4(),
            optimization_id: def.id.to_string(),
            area: def.area,
            name: def.name.to_string(),
            status: OptimizationStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            baseline_p95_ms: baseline,
            projected_p95_ms: None,
            improvement_percent: None,
        };

        match self.active.entry(def.id) {
            Entry::Occupied(_) => return Err(OptimizationError::AlreadyRunning(def.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(execution.clone());
            }
        }
        let _active = ActiveGuard {
            active: &self.active,
            id: def.id,
        };

        tracing::info!(
            execution_id = %execution.id,
            optimization = def.id,
            area = %def.area,
            "Optimization started"
        );

        let wait = def.duration_ms as f64 * self.duration_scale;
        if wait > 0.0 {
            tokio::time::sleep(Duration::from_millis(wait as u64)).await;
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let improvement = round2(rng.gen_range(def.min_improvement..=def.max_improvement));

        execution.status = OptimizationStatus::Completed;
        execution.completed_at = Some(Utc::now());
        execution.improvement_percent = Some(improvement);
        execution.projected_p95_ms = Some(round2(baseline * (1.0 - improvement / 100.0)));

        tracing::info!(
            execution_id = %execution.id,
            optimization = def.id,
            improvement_percent = improvement,
            "Optimization completed"
        );

        let mut history = self.history.write();
        if history.len() >= EXECUTION_HISTORY {
            history.pop_front();
        }
        history.push_back(execution.clone());
        Ok(execution)
    }

    /// In-flight executions first, then finished ones newest first
    pub fn history(&self, area: Option<OptimizationArea>, limit: usize) -> Vec<OptimizationExecution> {
        let in_area = |e: &OptimizationExecution| area.map_or(true, |a| e.area == a);

        let mut running: Vec<OptimizationExecution> = self
            .active
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| in_area(e))
            .collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let history = self.history.read();
        running
            .into_iter()
            .chain(history.iter().rev().filter(|e| in_area(e)).cloned())
            .take(limit)
            .collect()
    }

    /// Catalog entries addressing the report's bottlenecks, highest priority first
    pub fn recommendations(&self, report: &BottleneckReport) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = CATALOG
            .iter()
            .filter_map(|def| {
                let (kind, priority) = def
                    .addresses
                    .iter()
                    .filter_map(|kind| report.most_severe(*kind).map(|s| (*kind, s)))
                    .max_by_key(|(_, s)| *s)?;
                Some(Recommendation {
                    optimization: def,
                    priority,
                    reason: format!("Addresses {} bottleneck ({})", kind, priority),
                })
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                b.optimization
                    .max_improvement
                    .total_cmp(&a.optimization.max_improvement)
            })
        });
        recommendations
    }
}

/// Clears the in-flight marker even when the executing future is dropped
struct ActiveGuard<'a> {
    active: &'a DashMap<&'static str, OptimizationExecution>,
    id: &'static str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(self.id);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("Optimization not found: {0}")]
    NotFound(String),

    #[error("Optimization {0} is already running")]
    AlreadyRunning(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bottleneck::{Bottleneck, BottleneckKind};

    fn service(scale: f64) -> Arc<OptimizationService> {
        Arc::new(OptimizationService::with_duration_scale(
            Arc::new(PerformanceMonitor::new()),
            scale,
        ))
    }

    fn report(findings: &[(BottleneckKind, Severity)]) -> BottleneckReport {
        BottleneckReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            bottlenecks: findings
                .iter()
                .map(|(kind, severity)| Bottleneck {
                    kind: *kind,
                    severity: *severity,
                    description: String::new(),
                    value: 0.0,
                    threshold: 0.0,
                    endpoint: None,
                    recommendations: vec![],
                })
                .collect(),
            health_score: 50,
        }
    }

    #[tokio::test]
    async fn test_execute_is_seeded() {
        let svc = service(0.0);
        let a = svc.execute("db-index-tuning", Some(7)).await.unwrap();
        let b = svc.execute("db-index-tuning", Some(7)).await.unwrap();

        assert_eq!(a.status, OptimizationStatus::Completed);
        assert_eq!(a.improvement_percent, b.improvement_percent);
        let improvement = a.improvement_percent.unwrap();
        assert!((25.0..=60.0).contains(&improvement));
        assert_eq!(svc.history(Some(OptimizationArea::Database), 10).len(), 2);
        assert!(svc.history(Some(OptimizationArea::Api), 10).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_optimization() {
        let svc = service(0.0);
        assert!(matches!(
            svc.execute("turbo-mode", None).await,
            Err(OptimizationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_execution_rejected() {
        let svc = service(0.05);
        let first = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.execute("api-compression", None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(svc.history(None, 10)[0].status, OptimizationStatus::Running);
        assert!(matches!(
            svc.execute("api-compression", None).await,
            Err(OptimizationError::AlreadyRunning(_))
        ));

        first.await.unwrap().unwrap();
        assert!(svc.execute("api-compression", Some(1)).await.is_ok());
    }

    #[test]
    fn test_recommendations_follow_bottlenecks() {
        let svc = service(0.0);
        let recs = svc.recommendations(&report(&[
            (BottleneckKind::HighMemory, Severity::Critical),
            (BottleneckKind::SlowEndpoint, Severity::Medium),
        ]));

        assert!(!recs.is_empty());
        assert_eq!(recs[0].priority, Severity::Critical);
        assert!(recs[0]
            .optimization
            .addresses
            .contains(&BottleneckKind::HighMemory));
        assert!(recs
            .iter()
            .all(|r| r.optimization.area != OptimizationArea::Frontend || r.priority == Severity::Medium));

        assert!(svc.recommendations(&report(&[])).is_empty());
    }
}

//! Simulated load, stress and memory tests
//!
//! Tests are recorded as [`TestRun`]s. `start` spawns the work and returns
//! the running record immediately, `run` waits for it to finish.

pub mod load;
pub mod memory;
pub mod stress;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

pub use load::{LoadTestConfig, LoadTestResult};
pub use memory::{MemoryTestConfig, MemoryTestResult};
pub use stress::{StressPhase, StressTestConfig, StressTestResult};

use crate::data::ValidationError;
use crate::storage::MemoryStats;

const MAX_RUNS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Load,
    Stress,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TestResult {
    Load(LoadTestResult),
    Stress(StressTestResult),
    Memory {
        #[serde(flatten)]
        result: MemoryTestResult,
        tracker: MemoryStats,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub id: Uuid,
    pub kind: TestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A test to perform
#[derive(Debug, Clone)]
pub enum TestJob {
    Load(LoadTestConfig),
    Stress(StressTestConfig),
    Memory(MemoryTestConfig),
}

impl TestJob {
    pub fn kind(&self) -> TestKind {
        match self {
            TestJob::Load(_) => TestKind::Load,
            TestJob::Stress(_) => TestKind::Stress,
            TestJob::Memory(_) => TestKind::Memory,
        }
    }

    fn name(&self) -> Option<String> {
        match self {
            TestJob::Load(c) => c.name.clone(),
            TestJob::Stress(c) => c.name.clone(),
            TestJob::Memory(c) => c.name.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TestJob::Load(c) => c.validate(),
            TestJob::Stress(c) => c.validate(),
            TestJob::Memory(c) => c.validate(),
        }
    }
}

pub struct TestRunner {
    runs: DashMap<Uuid, TestRun>,
    /// Multiplier on simulated latency for real sleeping; `0.0` never sleeps
    time_scale: f64,
}

impl TestRunner {
    pub fn new(time_scale: f64) -> Self {
        Self {
            runs: DashMap::new(),
            time_scale: time_scale.max(0.0),
        }
    }

    /// Validate, record and spawn `job`; returns the running record
    pub fn start(self: &Arc<Self>, job: TestJob) -> Result<TestRun, TestingError> {
        job.validate()?;
        let run = self.register(&job);

        let runner = Arc::clone(self);
        let id = run.id;
        tokio::spawn(async move {
            let outcome = contain_panic(runner.perform(job)).await;
            runner.finish(id, outcome);
        });

        Ok(run)
    }

    /// Validate, record and perform `job`; returns the finished record
    pub async fn run(&self, job: TestJob) -> Result<TestRun, TestingError> {
        job.validate()?;
        let run = self.register(&job);
        let outcome = contain_panic(self.perform(job)).await;
        Ok(self.finish(run.id, outcome).unwrap_or(run))
    }

    pub fn get(&self, id: &Uuid) -> Result<TestRun, TestingError> {
        self.runs
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(TestingError::NotFound(*id))
    }

    /// Runs, newest first
    pub fn list(&self, kind: Option<TestKind>, limit: usize) -> Vec<TestRun> {
        let mut runs: Vec<TestRun> = self
            .runs
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        runs.truncate(limit);
        runs
    }

    fn register(&self, job: &TestJob) -> TestRun {
        let run = TestRun {
            id: Uuid::new_v4(),
            kind: job.kind(),
            name: job.name(),
            status: TestStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        };
        tracing::info!(test_id = %run.id, kind = ?run.kind, "Performance test started");

        self.evict_finished();
        self.runs.insert(run.id, run.clone());
        run
    }

    async fn perform(&self, job: TestJob) -> Result<TestResult, TestingError> {
        match job {
            TestJob::Load(config) => Ok(TestResult::Load(load::simulate(&config, self.time_scale).await)),
            TestJob::Stress(config) => Ok(TestResult::Stress(
                stress::simulate(&config, self.time_scale).await,
            )),
            TestJob::Memory(config) => {
                let (result, tracker) = tokio::task::spawn_blocking(move || memory::simulate(&config))
                    .await
                    .map_err(|e| TestingError::Aborted(e.to_string()))?;
                Ok(TestResult::Memory { result, tracker })
            }
        }
    }

    fn finish(&self, id: Uuid, outcome: Result<TestResult, TestingError>) -> Option<TestRun> {
        let mut run = self.runs.get_mut(&id)?;
        run.completed_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                run.status = TestStatus::Completed;
                run.result = Some(result);
                tracing::info!(test_id = %id, "Performance test completed");
            }
            Err(e) => {
                run.status = TestStatus::Failed;
                run.error = Some(e.to_string());
                tracing::error!(test_id = %id, error = %e, "Performance test failed");
            }
        }
        Some(run.clone())
    }

    /// Keep the run table bounded by dropping the oldest finished runs
    fn evict_finished(&self) {
        if self.runs.len() < MAX_RUNS {
            return;
        }
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = self
            .runs
            .iter()
            .filter(|r| r.status != TestStatus::Running)
            .map(|r| (r.started_at, r.id))
            .collect();
        finished.sort();

        let excess = self.runs.len() + 1 - MAX_RUNS;
        for (_, id) in finished.into_iter().take(excess) {
            self.runs.remove(&id);
        }
    }
}

/// Turn a panic inside `work` into an aborted outcome so the run still finishes
async fn contain_panic<F>(work: F) -> Result<TestResult, TestingError>
where
    F: Future<Output = Result<TestResult, TestingError>>,
{
    AssertUnwindSafe(work)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(TestingError::Aborted(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "simulation panicked".to_string())
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TestingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Test run not found: {0}")]
    NotFound(Uuid),

    #[error("Test aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn load_job() -> TestJob {
        TestJob::Load(LoadTestConfig {
            concurrent_users: 5,
            requests_per_user: 5,
            seed: Some(3),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_run_records_result() {
        let runner = TestRunner::new(0.0);
        let run = runner.run(load_job()).await.unwrap();
        assert_eq!(run.status, TestStatus::Completed);
        assert!(matches!(run.result, Some(TestResult::Load(ref r)) if r.total_requests == 25));
        assert!(run.completed_at.is_some());
        assert_eq!(runner.get(&run.id).unwrap().status, TestStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_returns_running_then_completes() {
        let runner = Arc::new(TestRunner::new(0.0));
        let run = runner.start(load_job()).unwrap();
        assert_eq!(run.status, TestStatus::Running);

        let mut status = run.status;
        for _ in 0..100 {
            status = runner.get(&run.id).unwrap().status;
            if status != TestStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status, TestStatus::Completed);
    }

    #[tokio::test]
    async fn test_memory_and_listing() {
        let runner = TestRunner::new(0.0);
        runner.run(load_job()).await.unwrap();
        let memory = runner
            .run(TestJob::Memory(MemoryTestConfig {
                iterations: 5,
                allocation_kb: 4,
                ..Default::default()
            }))
            .await
            .unwrap();

        let json = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["kind"], "memory");
        assert_eq!(json["result"]["iterations_completed"], 5);
        assert_eq!(json["result"]["tracker"]["current_bytes"], 0);

        assert_eq!(runner.list(None, 10).len(), 2);
        assert_eq!(runner.list(Some(TestKind::Memory), 10).len(), 1);
    }

    async fn exploding_simulation() -> Result<TestResult, TestingError> {
        panic!("latency out of range")
    }

    #[tokio::test]
    async fn test_panicking_simulation_marks_run_failed() {
        let runner = TestRunner::new(0.0);
        let job = load_job();
        let run = runner.register(&job);

        let outcome = contain_panic(exploding_simulation()).await;
        assert!(matches!(outcome, Err(TestingError::Aborted(ref msg)) if msg == "latency out of range"));

        let finished = runner.finish(run.id, outcome).unwrap();
        assert_eq!(finished.status, TestStatus::Failed);
        assert!(finished.completed_at.is_some());
        assert_eq!(
            finished.error.as_deref(),
            Some("Test aborted: latency out of range")
        );
        assert_eq!(runner.get(&run.id).unwrap().status, TestStatus::Failed);
    }

    #[tokio::test]
    async fn test_extreme_latency_rejected_before_running() {
        let runner = Arc::new(TestRunner::new(0.0));
        let load = TestJob::Load(LoadTestConfig {
            base_latency_ms: 1e308,
            ..Default::default()
        });
        let stress = TestJob::Stress(StressTestConfig {
            base_latency_ms: 1e308,
            ..Default::default()
        });

        assert!(matches!(runner.start(load), Err(TestingError::Validation(_))));
        assert!(matches!(runner.run(stress).await, Err(TestingError::Validation(_))));
        assert!(runner.list(None, 10).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let runner = TestRunner::new(0.0);
        let job = TestJob::Load(LoadTestConfig {
            concurrent_users: 0,
            ..Default::default()
        });
        assert!(matches!(runner.run(job).await, Err(TestingError::Validation(_))));
        assert!(runner.list(None, 10).is_empty());
        assert!(matches!(
            runner.get(&Uuid::new_v4()),
            Err(TestingError::NotFound(_))
        ));
    }
}

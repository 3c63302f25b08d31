//! Data retention: expired records move into archives, expired archives are purged
//!
//! Archived records leave the live collections but can be restored until the
//! archive itself expires.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use uuid::Uuid;

use crate::data::{ArchiveSource, AutomationExecution, DataArchive, Metric};
use crate::storage::Repository;

/// How long each kind of record is kept
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub metric_retention: ChronoDuration,
    pub execution_retention: ChronoDuration,
    pub archive_retention: ChronoDuration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            metric_retention: ChronoDuration::days(90),
            execution_retention: ChronoDuration::days(30),
            archive_retention: ChronoDuration::days(365),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub archived_metrics: usize,
    pub archived_executions: usize,
    pub purged_archives: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveFilter {
    pub source_type: Option<ArchiveSource>,
    pub limit: Option<usize>,
}

pub struct RetentionService {
    repository: Arc<Repository>,
    policy: RetentionPolicy,
}

impl RetentionService {
    pub fn new(repository: Arc<Repository>, policy: RetentionPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Archive expired live records and purge expired archives
    pub fn run(&self, now: DateTime<Utc>) -> Result<RetentionReport, RetentionError> {
        let expires_at = now + self.policy.archive_retention;
        let mut report = RetentionReport::default();

        let metric_cutoff = now - self.policy.metric_retention;
        for metric in self.repository.metrics_where(|m| m.timestamp < metric_cutoff) {
            let archive = DataArchive::new(
                ArchiveSource::Metric,
                metric.id,
                &metric,
                "retention",
                now,
                expires_at,
            )?;
            // Insert before removing so the record is never absent from both collections
            self.repository.insert_archive(archive);
            self.repository.remove_metric(&metric.id);
            report.archived_metrics += 1;
        }

        let execution_cutoff = now - self.policy.execution_retention;
        for execution in self
            .repository
            .executions_where(|e| e.status.is_terminal() && e.updated_at < execution_cutoff)
        {
            let archive = DataArchive::new(
                ArchiveSource::AutomationExecution,
                execution.id,
                &execution,
                "retention",
                now,
                expires_at,
            )?;
            self.repository.insert_archive(archive);
            self.repository.remove_execution(&execution.id);
            report.archived_executions += 1;
        }

        for archive in self.repository.archives_where(|a| a.is_expired(now)) {
            self.repository.remove_archive(&archive.id);
            report.purged_archives += 1;
        }

        if report != RetentionReport::default() {
            tracing::info!(
                archived_metrics = report.archived_metrics,
                archived_executions = report.archived_executions,
                purged_archives = report.purged_archives,
                "Retention pass finished"
            );
        }

        Ok(report)
    }

    /// Archives, newest first
    pub fn list_archives(&self, filter: &ArchiveFilter) -> Vec<DataArchive> {
        let mut archives = self
            .repository
            .archives_where(|a| filter.source_type.map_or(true, |s| a.source_type == s));
        archives.sort_by(|a, b| b.archived_at.cmp(&a.archived_at).then_with(|| a.id.cmp(&b.id)));
        archives.truncate(filter.limit.unwrap_or(100).clamp(1, 1000));
        archives
    }

    pub fn get_archive(&self, id: &Uuid) -> Result<DataArchive, RetentionError> {
        self.repository
            .get_archive(id)
            .ok_or(RetentionError::NotFound(*id))
    }

    /// Put the archived record back into its live collection and drop the archive
    pub fn restore_archive(&self, id: &Uuid) -> Result<DataArchive, RetentionError> {
        let archive = self.get_archive(id)?;

        match archive.source_type {
            ArchiveSource::Metric => {
                let metric: Metric = serde_json::from_value(archive.data.clone())?;
                self.repository.insert_metric(metric);
            }
            ArchiveSource::AutomationExecution => {
                let execution: AutomationExecution = serde_json::from_value(archive.data.clone())?;
                self.repository.insert_execution(execution);
            }
        }
        self.repository.remove_archive(id);

        tracing::info!(
            archive_id = %id,
            source_id = %archive.source_id,
            "Archive restored"
        );
        Ok(archive)
    }
}

/// Runs retention passes on a fixed interval
pub struct RetentionWorker {
    service: Arc<RetentionService>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl RetentionWorker {
    pub fn new(service: Arc<RetentionService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Retention worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                if let Err(e) = self.service.run(Utc::now()) {
                    tracing::error!(error = %e, "Retention pass failed");
                }
            }

            tracing::info!("Retention worker stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("Archive not found: {0}")]
    NotFound(Uuid),

    #[error("Archive payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExecutionStatus, NewExecution, NewMetric};

    fn setup() -> (Arc<Repository>, RetentionService) {
        let repo = Arc::new(Repository::new());
        let svc = RetentionService::new(Arc::clone(&repo), RetentionPolicy::default());
        (repo, svc)
    }

    #[test]
    fn test_archives_old_metrics_only() {
        let (repo, svc) = setup();
        let now = Utc::now();
        let old = NewMetric::new("workflow", "wf", "runs", 1.0)
            .with_timestamp(now - ChronoDuration::days(91))
            .into_metric(now)
            .unwrap();
        let fresh = NewMetric::new("workflow", "wf", "runs", 2.0)
            .into_metric(now)
            .unwrap();
        let old_id = old.id;
        repo.insert_metric(old);
        repo.insert_metric(fresh);

        let report = svc.run(now).unwrap();
        assert_eq!(report.archived_metrics, 1);
        assert_eq!(repo.metric_count(), 1);
        assert!(repo.get_metric(&old_id).is_none());

        let archives = svc.list_archives(&ArchiveFilter::default());
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].source_id, old_id);
        assert_eq!(archives[0].expires_at, now + ChronoDuration::days(365));
    }

    #[test]
    fn test_only_terminal_executions_archived() {
        let (repo, svc) = setup();
        let now = Utc::now();
        let long_ago = now - ChronoDuration::days(31);

        let mut finished = NewExecution::new("a", "A").into_execution(long_ago).unwrap();
        finished.status = ExecutionStatus::Completed;
        let pending = NewExecution::new("b", "B").into_execution(long_ago).unwrap();
        repo.insert_execution(finished);
        repo.insert_execution(pending);

        let report = svc.run(now).unwrap();
        assert_eq!(report.archived_executions, 1);
        assert_eq!(repo.execution_count(), 1);
    }

    #[test]
    fn test_restore_and_purge() {
        let (repo, svc) = setup();
        let now = Utc::now();
        let metric = NewMetric::new("workflow", "wf", "runs", 1.0)
            .with_timestamp(now - ChronoDuration::days(100))
            .into_metric(now)
            .unwrap();
        let metric_id = metric.id;
        repo.insert_metric(metric);
        svc.run(now).unwrap();

        let archive = svc.list_archives(&ArchiveFilter::default()).remove(0);
        svc.restore_archive(&archive.id).unwrap();
        assert!(repo.get_metric(&metric_id).is_some());
        assert_eq!(repo.archive_count(), 0);
        assert!(matches!(
            svc.restore_archive(&archive.id),
            Err(RetentionError::NotFound(_))
        ));

        // Re-archive, then run far in the future so the archive expires
        svc.run(now).unwrap();
        let later = now + ChronoDuration::days(400);
        let report = svc.run(later).unwrap();
        assert_eq!(report.purged_archives, 1);
        assert_eq!(repo.archive_count(), 0);
    }
}

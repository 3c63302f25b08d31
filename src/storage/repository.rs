use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{AutomationExecution, DataArchive, Metric};

/// Concurrent in-memory collections for every stored record type
#[derive(Debug, Default)]
pub struct Repository {
    metrics: DashMap<Uuid, Metric>,
    executions: DashMap<Uuid, AutomationExecution>,
    archives: DashMap<Uuid, DataArchive>,
}

/// Point-in-time copy of the whole repository, used by backups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub metrics: Vec<Metric>,
    pub executions: Vec<AutomationExecution>,
    pub archives: Vec<DataArchive>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub metrics: usize,
    pub executions: usize,
    pub archives: usize,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    pub fn insert_metric(&self, metric: Metric) {
        self.metrics.insert(metric.id, metric);
    }

    pub fn get_metric(&self, id: &Uuid) -> Option<Metric> {
        self.metrics.get(id).map(|m| m.clone())
    }

    pub fn remove_metric(&self, id: &Uuid) -> Option<Metric> {
        self.metrics.remove(id).map(|(_, m)| m)
    }

    /// Clone every metric matching the predicate
    pub fn metrics_where<F>(&self, predicate: F) -> Vec<Metric>
    where
        F: Fn(&Metric) -> bool,
    {
        self.metrics
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    // ------------------------------------------------------------------
    // Automation executions
    // ------------------------------------------------------------------

    pub fn insert_execution(&self, execution: AutomationExecution) {
        self.executions.insert(execution.id, execution);
    }

    pub fn get_execution(&self, id: &Uuid) -> Option<AutomationExecution> {
        self.executions.get(id).map(|e| e.clone())
    }

    pub fn remove_execution(&self, id: &Uuid) -> Option<AutomationExecution> {
        self.executions.remove(id).map(|(_, e)| e)
    }

    /// Run `f` against the stored execution while holding its entry lock.
    /// Returns `None` when the id is unknown.
    pub fn update_execution<R, F>(&self, id: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut AutomationExecution) -> R,
    {
        self.executions.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    pub fn executions_where<F>(&self, predicate: F) -> Vec<AutomationExecution>
    where
        F: Fn(&AutomationExecution) -> bool,
    {
        self.executions
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    // ------------------------------------------------------------------
    // Archives
    // ------------------------------------------------------------------

    pub fn insert_archive(&self, archive: DataArchive) {
        self.archives.insert(archive.id, archive);
    }

    pub fn get_archive(&self, id: &Uuid) -> Option<DataArchive> {
        self.archives.get(id).map(|a| a.clone())
    }

    pub fn remove_archive(&self, id: &Uuid) -> Option<DataArchive> {
        self.archives.remove(id).map(|(_, a)| a)
    }

    pub fn archives_where<F>(&self, predicate: F) -> Vec<DataArchive>
    where
        F: Fn(&DataArchive) -> bool,
    {
        self.archives
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    // ------------------------------------------------------------------
    // Whole-repository operations
    // ------------------------------------------------------------------

    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            metrics: self.metrics.len(),
            executions: self.executions.len(),
            archives: self.archives.len(),
        }
    }

    pub fn snapshot(&self) -> RepositorySnapshot {
        RepositorySnapshot {
            metrics: self.metrics.iter().map(|e| e.value().clone()).collect(),
            executions: self.executions.iter().map(|e| e.value().clone()).collect(),
            archives: self.archives.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// Replace all contents with the snapshot
    pub fn replace_from(&self, snapshot: RepositorySnapshot) {
        self.metrics.clear();
        self.executions.clear();
        self.archives.clear();

        for metric in snapshot.metrics {
            self.insert_metric(metric);
        }
        for execution in snapshot.executions {
            self.insert_execution(execution);
        }
        for archive in snapshot.archives {
            self.insert_archive(archive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NewExecution, NewMetric};
    use chrono::Utc;

    fn metric(name: &str, value: f64) -> Metric {
        NewMetric::new("workflow", "wf-1", name, value)
            .into_metric(Utc::now())
            .unwrap()
    }

    #[test]
    fn test_metric_insert_and_filter() {
        let repo = Repository::new();
        repo.insert_metric(metric("runs", 1.0));
        repo.insert_metric(metric("runs", 2.0));
        repo.insert_metric(metric("errors", 5.0));

        assert_eq!(repo.metric_count(), 3);
        assert_eq!(repo.metrics_where(|m| m.name == "runs").len(), 2);
    }

    #[test]
    fn test_update_execution() {
        let repo = Repository::new();
        let exec = NewExecution::new("sync", "Sync").into_execution(Utc::now()).unwrap();
        let id = exec.id;
        repo.insert_execution(exec);

        let updated = repo.update_execution(&id, |e| {
            e.retry_count = 2;
            e.retry_count
        });
        assert_eq!(updated, Some(2));
        assert_eq!(repo.get_execution(&id).unwrap().retry_count, 2);
        assert_eq!(repo.update_execution(&Uuid::new_v4(), |_| ()), None);
    }

    #[test]
    fn test_snapshot_replace() {
        let repo = Repository::new();
        repo.insert_metric(metric("runs", 1.0));
        let snapshot = repo.snapshot();

        repo.insert_metric(metric("runs", 2.0));
        assert_eq!(repo.metric_count(), 2);

        repo.replace_from(snapshot);
        assert_eq!(repo.stats().metrics, 1);
    }
}

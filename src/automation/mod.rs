//! Automation execution records and their lifecycle
//!
//! ```text
//! pending --start--> running --complete--> completed
//!    |                  |  \---fail-----> failed --retry--> pending
//!    \--cancel--> cancelled <--cancel--/
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::data::{AutomationExecution, ExecutionStatus, NewExecution, ValidationError};
use crate::stats::round2;
use crate::storage::Repository;

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionFilter {
    pub automation_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPage {
    pub data: Vec<AutomationExecution>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Percentage of finished runs that completed
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub total_retries: u64,
}

pub struct AutomationService {
    repository: Arc<Repository>,
}

impl AutomationService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub fn create(&self, input: NewExecution) -> Result<AutomationExecution, AutomationError> {
        let execution = input.into_execution(Utc::now())?;
        tracing::info!(
            execution_id = %execution.id,
            automation_id = %execution.automation_id,
            trigger = %execution.trigger,
            "Automation execution created"
        );
        self.repository.insert_execution(execution.clone());
        Ok(execution)
    }

    pub fn get(&self, id: &Uuid) -> Result<AutomationExecution, AutomationError> {
        self.repository
            .get_execution(id)
            .ok_or(AutomationError::NotFound(*id))
    }

    pub fn start(&self, id: &Uuid) -> Result<AutomationExecution, AutomationError> {
        self.transition(id, ExecutionStatus::Running, |exec, now| {
            exec.started_at = Some(now);
        })
    }

    pub fn complete(
        &self,
        id: &Uuid,
        output: Option<serde_json::Value>,
    ) -> Result<AutomationExecution, AutomationError> {
        self.transition(id, ExecutionStatus::Completed, |exec, now| {
            exec.output = output;
            finish(exec, now);
        })
    }

    pub fn fail(&self, id: &Uuid, error: String) -> Result<AutomationExecution, AutomationError> {
        if error.trim().is_empty() {
            return Err(ValidationError::MissingField("error").into());
        }
        self.transition(id, ExecutionStatus::Failed, |exec, now| {
            exec.error = Some(error);
            finish(exec, now);
        })
    }

    pub fn cancel(&self, id: &Uuid) -> Result<AutomationExecution, AutomationError> {
        self.transition(id, ExecutionStatus::Cancelled, |exec, now| {
            if exec.started_at.is_some() {
                finish(exec, now);
            } else {
                exec.completed_at = Some(now);
            }
        })
    }

    /// Put a failed execution back to pending while it has retries left
    pub fn retry(&self, id: &Uuid) -> Result<AutomationExecution, AutomationError> {
        let now = Utc::now();
        let result = self
            .repository
            .update_execution(id, |exec| {
                if exec.status != ExecutionStatus::Failed {
                    return Err(AutomationError::InvalidTransition {
                        from: exec.status,
                        to: ExecutionStatus::Pending,
                    });
                }
                if exec.retry_count >= exec.max_retries {
                    return Err(AutomationError::RetriesExhausted {
                        id: exec.id,
                        max_retries: exec.max_retries,
                    });
                }

                exec.retry_count += 1;
                exec.status = ExecutionStatus::Pending;
                exec.error = None;
                exec.output = None;
                exec.started_at = None;
                exec.completed_at = None;
                exec.duration_ms = None;
                exec.updated_at = now;
                Ok(exec.clone())
            })
            .ok_or(AutomationError::NotFound(*id))??;

        tracing::info!(
            execution_id = %id,
            retry_count = result.retry_count,
            "Automation execution queued for retry"
        );
        Ok(result)
    }

    pub fn list(&self, filter: &ExecutionFilter) -> ExecutionPage {
        let mut matches = self.repository.executions_where(|e| {
            filter
                .automation_id
                .as_deref()
                .map_or(true, |id| e.automation_id == id)
                && filter.status.map_or(true, |s| e.status == s)
        });
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len();
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        ExecutionPage {
            data: matches.into_iter().skip(filter.offset).take(limit).collect(),
            total,
        }
    }

    pub fn stats(&self, automation_id: Option<&str>) -> ExecutionStats {
        let executions = self
            .repository
            .executions_where(|e| automation_id.map_or(true, |id| e.automation_id == id));

        let mut by_status: BTreeMap<String, usize> = ExecutionStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut total_retries = 0u64;
        let mut durations = Vec::new();

        for exec in &executions {
            *by_status.entry(exec.status.as_str().to_string()).or_default() += 1;
            total_retries += exec.retry_count as u64;
            if let Some(d) = exec.duration_ms {
                durations.push(d as f64);
            }
        }

        let completed = by_status.get("completed").copied().unwrap_or(0);
        let failed = by_status.get("failed").copied().unwrap_or(0);
        let finished = completed + failed;

        ExecutionStats {
            total: executions.len(),
            by_status,
            success_rate: if finished == 0 {
                0.0
            } else {
                round2(completed as f64 / finished as f64 * 100.0)
            },
            avg_duration_ms: if durations.is_empty() {
                0.0
            } else {
                round2(durations.iter().sum::<f64>() / durations.len() as f64)
            },
            total_retries,
        }
    }

    fn transition<F>(
        &self,
        id: &Uuid,
        next: ExecutionStatus,
        apply: F,
    ) -> Result<AutomationExecution, AutomationError>
    where
        F: FnOnce(&mut AutomationExecution, DateTime<Utc>),
    {
        let now = Utc::now();
        let updated = self
            .repository
            .update_execution(id, |exec| {
                if !exec.status.can_transition_to(next) {
                    return Err(AutomationError::InvalidTransition {
                        from: exec.status,
                        to: next,
                    });
                }
                exec.status = next;
                exec.updated_at = now;
                apply(exec, now);
                Ok(exec.clone())
            })
            .ok_or(AutomationError::NotFound(*id))??;

        tracing::info!(execution_id = %id, status = %next, "Automation execution updated");
        Ok(updated)
    }
}

fn finish(exec: &mut AutomationExecution, now: DateTime<Utc>) {
    exec.completed_at = Some(now);
    exec.duration_ms = exec
        .started_at
        .map(|started| (now - started).num_milliseconds().max(0));
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Automation execution not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot move execution from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Execution {id} has used all {max_retries} retries")]
    RetriesExhausted { id: Uuid, max_retries: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AutomationService {
        AutomationService::new(Arc::new(Repository::new()))
    }

    #[test]
    fn test_happy_path() {
        let svc = service();
        let exec = svc.create(NewExecution::new("crm-sync", "CRM Sync")).unwrap();

        let running = svc.start(&exec.id).unwrap();
        assert_eq!(running.status, ExecutionStatus::Running);
        assert!(running.started_at.is_some());

        let done = svc
            .complete(&exec.id, Some(serde_json::json!({"synced": 12})))
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert!(done.duration_ms.unwrap() >= 0);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_invalid_transitions() {
        let svc = service();
        let exec = svc.create(NewExecution::new("crm-sync", "CRM Sync")).unwrap();

        let err = svc.complete(&exec.id, None).unwrap_err();
        assert!(matches!(
            err,
            AutomationError::InvalidTransition {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Completed
            }
        ));

        svc.cancel(&exec.id).unwrap();
        assert!(svc.start(&exec.id).is_err());
        assert!(matches!(
            svc.start(&Uuid::new_v4()),
            Err(AutomationError::NotFound(_))
        ));
    }

    #[test]
    fn test_retry_until_exhausted() {
        let svc = service();
        let exec = svc
            .create(NewExecution::new("invoice-run", "Invoices").with_max_retries(1))
            .unwrap();

        svc.start(&exec.id).unwrap();
        svc.fail(&exec.id, "timeout".into()).unwrap();

        let retried = svc.retry(&exec.id).unwrap();
        assert_eq!(retried.status, ExecutionStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.error.is_none());

        svc.start(&exec.id).unwrap();
        svc.fail(&exec.id, "timeout again".into()).unwrap();
        assert!(matches!(
            svc.retry(&exec.id),
            Err(AutomationError::RetriesExhausted { max_retries: 1, .. })
        ));
    }

    #[test]
    fn test_stats() {
        let svc = service();
        for outcome in ["ok", "ok", "fail"] {
            let exec = svc.create(NewExecution::new("report", "Report")).unwrap();
            svc.start(&exec.id).unwrap();
            if outcome == "ok" {
                svc.complete(&exec.id, None).unwrap();
            } else {
                svc.fail(&exec.id, "boom".into()).unwrap();
            }
        }
        svc.create(NewExecution::new("other", "Other")).unwrap();

        let stats = svc.stats(Some("report"));
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status["completed"], 2);
        assert_eq!(stats.by_status["pending"], 0);
        assert_eq!(stats.success_rate, 66.67);

        let all = svc.stats(None);
        assert_eq!(all.total, 4);
        assert_eq!(all.by_status["pending"], 1);
    }

    #[test]
    fn test_list_filters_by_status() {
        let svc = service();
        let a = svc.create(NewExecution::new("a", "A")).unwrap();
        svc.create(NewExecution::new("b", "B")).unwrap();
        svc.start(&a.id).unwrap();

        let page = svc.list(&ExecutionFilter {
            status: Some(ExecutionStatus::Running),
            ..Default::default()
        });
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, a.id);
    }
}

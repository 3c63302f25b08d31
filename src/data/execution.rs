use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ValidationError;

/// Lifecycle status of an automation execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an allowed lifecycle step
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded run of an external workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: Uuid,
    pub automation_id: String,
    pub automation_name: String,
    pub status: ExecutionStatus,
    /// What started the run ("manual", "schedule", "webhook", ...)
    pub trigger: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExecution {
    #[serde(default)]
    pub automation_id: String,
    #[serde(default)]
    pub automation_name: String,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl NewExecution {
    pub fn new(automation_id: impl Into<String>, automation_name: impl Into<String>) -> Self {
        Self {
            automation_id: automation_id.into(),
            automation_name: automation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn into_execution(self, now: DateTime<Utc>) -> Result<AutomationExecution, ValidationError> {
        if self.automation_id.trim().is_empty() {
            return Err(ValidationError::MissingField("automation_id"));
        }
        let automation_name = if self.automation_name.trim().is_empty() {
            self.automation_id.clone()
        } else {
            self.automation_name
        };

        Ok(AutomationExecution {
            id: Uuid::new_v4(),
            automation_id: self.automation_id,
            automation_name,
            status: ExecutionStatus::Pending,
            trigger: self.trigger.unwrap_or_else(|| "manual".to_string()),
            input: self.input.unwrap_or(serde_json::Value::Null),
            output: None,
            error: None,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_new_execution_defaults() {
        let exec = NewExecution::new("lead-sync", "")
            .into_execution(Utc::now())
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.automation_name, "lead-sync");
        assert_eq!(exec.trigger, "manual");
        assert_eq!(exec.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_missing_automation_id() {
        let err = NewExecution::default().into_execution(Utc::now()).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("automation_id")));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of record held by an archive row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveSource {
    Metric,
    AutomationExecution,
}

/// Retained copy of a record that left the live collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArchive {
    pub id: Uuid,
    pub source_type: ArchiveSource,
    pub source_id: Uuid,
    /// The original record, serialized
    pub data: serde_json::Value,
    pub reason: String,
    pub archived_at: DateTime<Utc>,
    /// The archive row itself is purged after this instant
    pub expires_at: DateTime<Utc>,
}

impl DataArchive {
    pub fn new<T: Serialize>(
        source_type: ArchiveSource,
        source_id: Uuid,
        record: &T,
        reason: impl Into<String>,
        archived_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            source_type,
            source_id,
            data: serde_json::to_value(record)?,
            reason: reason.into(),
            archived_at,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

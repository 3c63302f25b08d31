use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

use super::ValidationError;

fn metric_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").expect("metric name pattern is valid")
    })
}

/// A timestamped numeric observation tied to a business entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: Uuid,
    /// Kind of entity the observation belongs to (e.g. "workflow", "customer")
    pub entity_type: String,
    pub entity_id: String,
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Time the record was stored
    pub created_at: DateTime<Utc>,
}

/// Input for recording a metric
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMetric {
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub name: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Defaults to the recording time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewMetric {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            name: name.into(),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validate the input and build a stored record
    pub fn into_metric(self, now: DateTime<Utc>) -> Result<Metric, ValidationError> {
        if self.entity_type.trim().is_empty() {
            return Err(ValidationError::MissingField("entity_type"));
        }
        if self.entity_id.trim().is_empty() {
            return Err(ValidationError::MissingField("entity_id"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if !metric_name_pattern().is_match(&self.name) {
            return Err(ValidationError::Invalid {
                field: "name",
                reason: format!("'{}' is not a valid metric name", self.name),
            });
        }
        let value = self.value.ok_or(ValidationError::MissingField("value"))?;
        if !value.is_finite() {
            return Err(ValidationError::Invalid {
                field: "value",
                reason: "must be a finite number".to_string(),
            });
        }

        Ok(Metric {
            id: Uuid::new_v4(),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            name: self.name,
            value,
            unit: self.unit,
            tags: self.tags,
            metadata: self.metadata,
            timestamp: self.timestamp.unwrap_or(now),
            created_at: now,
        })
    }
}

//! Alert rule and alert record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::data::{Severity, ValidationError};

pub const DEFAULT_COOLDOWN_SECS: u64 = 300;
/// Longest accepted cooldown, 30 days
pub const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 3600;

/// Fixed comparison between an observed value and a rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Above,
    Below,
    Equals,
    NotEquals,
    AboveOrEqual,
    BelowOrEqual,
}

impl Comparator {
    /// Whether `value <op> threshold` holds
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Above => value > threshold,
            Comparator::Below => value < threshold,
            Comparator::Equals => (value - threshold).abs() < f64::EPSILON,
            Comparator::NotEquals => (value - threshold).abs() >= f64::EPSILON,
            Comparator::AboveOrEqual => value >= threshold,
            Comparator::BelowOrEqual => value <= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Above => ">",
            Comparator::Below => "<",
            Comparator::Equals => "==",
            Comparator::NotEquals => "!=",
            Comparator::AboveOrEqual => ">=",
            Comparator::BelowOrEqual => "<=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Notification target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Threshold trigger over one path of the performance summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    /// Dot path into the summary JSON, e.g. `response_time.p95`
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: Severity,
    /// Minimum seconds between two firings of this rule
    pub cooldown_secs: u64,
    pub enabled: bool,
    /// Resolve this rule's open alerts once the condition clears
    pub auto_resolve: bool,
    pub targets: Vec<NotifyTarget>,
}

impl AlertRule {
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            metric: metric.into(),
            comparator,
            threshold,
            severity,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            enabled: true,
            auto_resolve: false,
            targets: vec![NotifyTarget::Log],
        }
    }

    pub fn with_cooldown(mut self, cooldown_secs: u64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn with_auto_resolve(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = auto_resolve;
        self
    }

    pub fn with_target(mut self, target: NotifyTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Rules installed on a fresh server
    pub fn defaults() -> Vec<AlertRule> {
        vec![
            AlertRule::new(
                "High response time",
                "response_time.p95",
                Comparator::Above,
                1000.0,
                Severity::High,
            ),
            AlertRule::new(
                "High error rate",
                "error_rate",
                Comparator::Above,
                5.0,
                Severity::Critical,
            ),
            AlertRule::new(
                "High memory usage",
                "system.rss_mb",
                Comparator::Above,
                1024.0,
                Severity::Medium,
            ),
        ]
    }
}

/// Client-supplied rule definition for create and update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertRuleInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metric: String,
    pub comparator: Option<Comparator>,
    pub threshold: Option<f64>,
    #[serde(default)]
    pub severity: Severity,
    pub cooldown_secs: Option<u64>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub auto_resolve: bool,
    pub targets: Option<Vec<NotifyTarget>>,
}

impl AlertRuleInput {
    /// Validate and build a rule carrying `id`
    pub fn into_rule(self, id: Uuid) -> Result<AlertRule, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.metric.trim().is_empty() {
            return Err(ValidationError::MissingField("metric"));
        }
        let comparator = self.comparator.ok_or(ValidationError::MissingField("comparator"))?;
        let threshold = self.threshold.ok_or(ValidationError::MissingField("threshold"))?;
        if !threshold.is_finite() {
            return Err(ValidationError::Invalid {
                field: "threshold",
                reason: "must be a finite number".to_string(),
            });
        }
        let cooldown_secs = self.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS);
        if cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(ValidationError::Invalid {
                field: "cooldown_secs",
                reason: format!("must be at most {}", MAX_COOLDOWN_SECS),
            });
        }

        Ok(AlertRule {
            id,
            name: self.name,
            metric: self.metric,
            comparator,
            threshold,
            severity: self.severity,
            cooldown_secs,
            enabled: self.enabled.unwrap_or(true),
            auto_resolve: self.auto_resolve,
            targets: self.targets.unwrap_or_else(|| vec![NotifyTarget::Log]),
        })
    }
}

/// Lifecycle of a fired alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Acknowledged)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (Active, Acknowledged)
                | (Active, Resolved)
                | (Active, Dismissed)
                | (Acknowledged, Resolved)
                | (Acknowledged, Dismissed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert synthesized from a rule firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub comparator: Comparator,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
}

impl PerformanceAlert {
    pub fn fire(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            metric: rule.metric.clone(),
            value,
            threshold: rule.threshold,
            comparator: rule.comparator,
            severity: rule.severity,
            status: AlertStatus::Active,
            message: format!(
                "{}: {} = {} {} threshold {}",
                rule.name, rule.metric, value, rule.comparator, rule.threshold
            ),
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            dismissed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparators() {
        assert!(Comparator::Above.holds(2.0, 1.0));
        assert!(!Comparator::Above.holds(1.0, 1.0));
        assert!(Comparator::AboveOrEqual.holds(1.0, 1.0));
        assert!(Comparator::Below.holds(0.5, 1.0));
        assert!(Comparator::BelowOrEqual.holds(1.0, 1.0));
        assert!(Comparator::Equals.holds(3.0, 3.0));
        assert!(Comparator::NotEquals.holds(3.0, 4.0));
    }

    #[test]
    fn test_status_transitions() {
        use AlertStatus::*;
        assert!(Active.can_transition_to(Acknowledged));
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(!Acknowledged.can_transition_to(Active));
        assert!(!Resolved.can_transition_to(Dismissed));
        assert!(!Dismissed.can_transition_to(Acknowledged));
    }

    #[test]
    fn test_rule_input_validation() {
        let input = AlertRuleInput {
            name: "Slow".into(),
            metric: "response_time.p95".into(),
            comparator: Some(Comparator::Above),
            threshold: None,
            ..Default::default()
        };
        assert!(matches!(
            input.into_rule(Uuid::new_v4()),
            Err(ValidationError::MissingField("threshold"))
        ));

        let rule: AlertRuleInput = serde_json::from_value(serde_json::json!({
            "name": "Slow",
            "metric": "response_time.p95",
            "comparator": "above_or_equal",
            "threshold": 250,
            "severity": "high",
            "targets": [{"type": "webhook", "url": "http://hooks.local/alert"}]
        }))
        .unwrap();
        let rule = rule.into_rule(Uuid::new_v4()).unwrap();
        assert_eq!(rule.comparator, Comparator::AboveOrEqual);
        assert_eq!(rule.cooldown_secs, 300);
        assert!(rule.enabled);
        assert!(matches!(rule.targets[0], NotifyTarget::Webhook { .. }));
    }

    #[test]
    fn test_cooldown_bounds() {
        let input = |cooldown_secs| AlertRuleInput {
            name: "Slow".into(),
            metric: "response_time.p95".into(),
            comparator: Some(Comparator::Above),
            threshold: Some(500.0),
            cooldown_secs: Some(cooldown_secs),
            ..Default::default()
        };

        let rule = input(MAX_COOLDOWN_SECS).into_rule(Uuid::new_v4()).unwrap();
        assert_eq!(rule.cooldown_secs, MAX_COOLDOWN_SECS);
        assert_eq!(input(0).into_rule(Uuid::new_v4()).unwrap().cooldown_secs, 0);

        for too_long in [MAX_COOLDOWN_SECS + 1, i64::MAX as u64, u64::MAX] {
            assert!(matches!(
                input(too_long).into_rule(Uuid::new_v4()),
                Err(ValidationError::Invalid { field: "cooldown_secs", .. })
            ));
        }
    }
}

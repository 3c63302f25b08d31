//! Rule registry and alert history

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::config::{AlertRule, AlertRuleInput, AlertStatus, PerformanceAlert};
use crate::data::{Severity, ValidationError};

pub const DEFAULT_ALERT_HISTORY: usize = 1000;

/// Listing filter for alerts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub rule_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Holds alert rules in insertion order and the alerts they fired
pub struct AlertManager {
    rules: RwLock<Vec<AlertRule>>,
    alerts: RwLock<VecDeque<PerformanceAlert>>,
    last_fired: RwLock<HashMap<Uuid, DateTime<Utc>>>,
    max_alerts: usize,
}

impl AlertManager {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self::with_history(rules, DEFAULT_ALERT_HISTORY)
    }

    pub fn with_history(rules: Vec<AlertRule>, max_alerts: usize) -> Self {
        Self {
            rules: RwLock::new(rules),
            alerts: RwLock::new(VecDeque::new()),
            last_fired: RwLock::new(HashMap::new()),
            max_alerts: max_alerts.max(1),
        }
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().clone()
    }

    pub fn rule(&self, id: &Uuid) -> Option<AlertRule> {
        self.rules.read().iter().find(|r| r.id == *id).cloned()
    }

    pub fn create_rule(&self, input: AlertRuleInput) -> Result<AlertRule, AlertError> {
        let rule = input.into_rule(Uuid::new_v4())?;
        tracing::info!(rule_id = %rule.id, name = %rule.name, "Alert rule created");
        self.rules.write().push(rule.clone());
        Ok(rule)
    }

    /// Replace a rule's definition, keeping its id and position
    pub fn update_rule(&self, id: &Uuid, input: AlertRuleInput) -> Result<AlertRule, AlertError> {
        let rule = input.into_rule(*id)?;
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or(AlertError::RuleNotFound(*id))?;
        *slot = rule.clone();
        tracing::info!(rule_id = %id, "Alert rule updated");
        Ok(rule)
    }

    pub fn delete_rule(&self, id: &Uuid) -> Result<AlertRule, AlertError> {
        let mut rules = self.rules.write();
        let pos = rules
            .iter()
            .position(|r| r.id == *id)
            .ok_or(AlertError::RuleNotFound(*id))?;
        self.last_fired.write().remove(id);
        tracing::info!(rule_id = %id, "Alert rule deleted");
        Ok(rules.remove(pos))
    }

    /// Run every enabled rule against `summary` and return the alerts fired
    pub fn evaluate(&self, summary: &serde_json::Value, now: DateTime<Utc>) -> Vec<PerformanceAlert> {
        let rules = self.rules();
        let mut fired = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            let Some(value) = lookup(summary, &rule.metric) else {
                tracing::debug!(rule = %rule.name, metric = %rule.metric, "Metric not present, rule skipped");
                continue;
            };

            if rule.comparator.holds(value, rule.threshold) {
                if !self.claim_firing(rule, now) {
                    continue;
                }
                let alert = PerformanceAlert::fire(rule, value, now);
                tracing::warn!(
                    alert_id = %alert.id,
                    rule = %rule.name,
                    severity = %rule.severity,
                    value,
                    threshold = rule.threshold,
                    "Performance alert fired"
                );
                self.push_alert(alert.clone());
                fired.push(alert);
            } else if rule.auto_resolve {
                let resolved = self.resolve_open_for_rule(&rule.id, now);
                if resolved > 0 {
                    tracing::info!(rule = %rule.name, resolved, "Alerts auto-resolved");
                }
            }
        }

        fired
    }

    pub fn alert(&self, id: &Uuid) -> Option<PerformanceAlert> {
        self.alerts.read().iter().find(|a| a.id == *id).cloned()
    }

    /// Alerts, newest first
    pub fn alerts(&self, filter: &AlertFilter) -> Vec<PerformanceAlert> {
        let limit = filter.limit.unwrap_or(100).clamp(1, DEFAULT_ALERT_HISTORY);
        self.alerts
            .read()
            .iter()
            .rev()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .filter(|a| filter.rule_id.map_or(true, |r| a.rule_id == r))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn acknowledge(&self, id: &Uuid, by: Option<String>) -> Result<PerformanceAlert, AlertError> {
        self.transition(id, AlertStatus::Acknowledged, |alert, now| {
            alert.acknowledged_at = Some(now);
            alert.acknowledged_by = by;
        })
    }

    pub fn resolve(&self, id: &Uuid) -> Result<PerformanceAlert, AlertError> {
        self.transition(id, AlertStatus::Resolved, |alert, now| {
            alert.resolved_at = Some(now);
        })
    }

    pub fn dismiss(&self, id: &Uuid) -> Result<PerformanceAlert, AlertError> {
        self.transition(id, AlertStatus::Dismissed, |alert, now| {
            alert.dismissed_at = Some(now);
        })
    }

    fn transition<F>(&self, id: &Uuid, next: AlertStatus, apply: F) -> Result<PerformanceAlert, AlertError>
    where
        F: FnOnce(&mut PerformanceAlert, DateTime<Utc>),
    {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == *id)
            .ok_or(AlertError::AlertNotFound(*id))?;

        if !alert.status.can_transition_to(next) {
            return Err(AlertError::InvalidTransition {
                from: alert.status,
                to: next,
            });
        }
        alert.status = next;
        apply(alert, Utc::now());

        tracing::info!(alert_id = %id, status = %next, "Alert updated");
        Ok(alert.clone())
    }

    /// Record `now` as the rule's last firing unless it is still cooling down.
    /// A cooldown too long to represent never expires.
    fn claim_firing(&self, rule: &AlertRule, now: DateTime<Utc>) -> bool {
        let mut last_fired = self.last_fired.write();
        if let Some(last) = last_fired.get(&rule.id) {
            let cooling = i64::try_from(rule.cooldown_secs)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .map_or(true, |cooldown| now.signed_duration_since(*last) < cooldown);
            if cooling {
                return false;
            }
        }
        last_fired.insert(rule.id, now);
        true
    }

    fn resolve_open_for_rule(&self, rule_id: &Uuid, now: DateTime<Utc>) -> usize {
        let mut alerts = self.alerts.write();
        let mut resolved = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.rule_id == *rule_id && a.status.is_open())
        {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(now);
            resolved += 1;
        }
        resolved
    }

    /// Append, evicting the oldest closed alert (or the oldest alert) when full
    fn push_alert(&self, alert: PerformanceAlert) {
        let mut alerts = self.alerts.write();
        while alerts.len() >= self.max_alerts {
            match alerts.iter().position(|a| !a.status.is_open()) {
                Some(pos) => {
                    alerts.remove(pos);
                }
                None => {
                    alerts.pop_front();
                }
            }
        }
        alerts.push_back(alert);
    }
}

/// Resolve a dot path such as `response_time.p95` to a number
fn lookup(value: &serde_json::Value, path: &str) -> Option<f64> {
    path.split('.')
        .try_fold(value, |current, key| match current {
            serde_json::Value::Object(map) => map.get(key),
            serde_json::Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })?
        .as_f64()
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Alert rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Cannot move alert from {from} to {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },
}

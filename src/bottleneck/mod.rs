//! Threshold analysis of the performance summary
//!
//! Each reading is graded against a warning and a critical threshold. Between
//! the two the finding is `medium` below the midpoint and `high` above it; at
//! or past the critical threshold it is `critical`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use crate::data::Severity;
use crate::monitoring::PerformanceSummary;
use crate::stats::round2;

pub const REPORT_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    SlowEndpoint,
    HighErrorRate,
    HighMemory,
    HighCpuLoad,
    TailLatency,
}

impl BottleneckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BottleneckKind::SlowEndpoint => "slow_endpoint",
            BottleneckKind::HighErrorRate => "high_error_rate",
            BottleneckKind::HighMemory => "high_memory",
            BottleneckKind::HighCpuLoad => "high_cpu_load",
            BottleneckKind::TailLatency => "tail_latency",
        }
    }

    fn recommendations(&self) -> Vec<String> {
        let items: &[&str] = match self {
            BottleneckKind::SlowEndpoint => &[
                "Cache responses for read-heavy endpoints",
                "Add indexes for the queries behind this endpoint",
                "Paginate large result sets",
            ],
            BottleneckKind::HighErrorRate => &[
                "Inspect recent 5xx responses for a common cause",
                "Add retries with backoff around flaky dependencies",
            ],
            BottleneckKind::HighMemory => &[
                "Bound in-memory caches and buffers",
                "Archive or purge old records sooner",
            ],
            BottleneckKind::HighCpuLoad => &[
                "Move heavy work to background workers",
                "Scale out to additional instances",
            ],
            BottleneckKind::TailLatency => &[
                "Look for lock contention or blocking calls on request paths",
                "Set timeouts on outbound calls",
            ],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for BottleneckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BottleneckThresholds {
    pub endpoint_p95_warning_ms: f64,
    pub endpoint_p95_critical_ms: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    pub rss_warning_mb: f64,
    pub rss_critical_mb: f64,
    pub load_per_cpu_warning: f64,
    pub load_per_cpu_critical: f64,
    pub p99_warning_ms: f64,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            endpoint_p95_warning_ms: 500.0,
            endpoint_p95_critical_ms: 1000.0,
            error_rate_warning: 1.0,
            error_rate_critical: 5.0,
            rss_warning_mb: 512.0,
            rss_critical_mb: 1024.0,
            load_per_cpu_warning: 0.8,
            load_per_cpu_critical: 1.5,
            p99_warning_ms: 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub severity: Severity,
    pub description: String,
    pub value: f64,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub bottlenecks: Vec<Bottleneck>,
    /// 0-100, lower is worse
    pub health_score: u32,
}

impl BottleneckReport {
    pub fn most_severe(&self, kind: BottleneckKind) -> Option<Severity> {
        self.bottlenecks
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.severity)
            .max()
    }
}

pub struct BottleneckAnalyzer {
    thresholds: BottleneckThresholds,
    reports: RwLock<VecDeque<BottleneckReport>>,
}

impl BottleneckAnalyzer {
    pub fn new(thresholds: BottleneckThresholds) -> Self {
        Self {
            thresholds,
            reports: RwLock::new(VecDeque::with_capacity(REPORT_HISTORY)),
        }
    }

    pub fn thresholds(&self) -> &BottleneckThresholds {
        &self.thresholds
    }

    /// Analyze `summary` and keep the report in history
    pub fn analyze(&self, summary: &PerformanceSummary) -> BottleneckReport {
        let report = self.inspect(summary);

        tracing::info!(
            report_id = %report.id,
            bottlenecks = report.bottlenecks.len(),
            health_score = report.health_score,
            "Bottleneck analysis finished"
        );

        let mut reports = self.reports.write();
        if reports.len() >= REPORT_HISTORY {
            reports.pop_front();
        }
        reports.push_back(report.clone());
        report
    }

    /// Analyze without recording
    pub fn inspect(&self, summary: &PerformanceSummary) -> BottleneckReport {
        let t = &self.thresholds;
        let mut found = Vec::new();

        for endpoint in &summary.endpoints {
            if let Some(severity) =
                grade(endpoint.p95_ms, t.endpoint_p95_warning_ms, t.endpoint_p95_critical_ms)
            {
                found.push(Bottleneck {
                    kind: BottleneckKind::SlowEndpoint,
                    severity,
                    description: format!(
                        "{} {} p95 latency is {} ms",
                        endpoint.method, endpoint.endpoint, endpoint.p95_ms
                    ),
                    value: endpoint.p95_ms,
                    threshold: t.endpoint_p95_warning_ms,
                    endpoint: Some(endpoint.endpoint.clone()),
                    recommendations: BottleneckKind::SlowEndpoint.recommendations(),
                });
            }
        }

        if let Some(severity) = grade(summary.error_rate, t.error_rate_warning, t.error_rate_critical) {
            found.push(Bottleneck {
                kind: BottleneckKind::HighErrorRate,
                severity,
                description: format!("{}% of requests failed", summary.error_rate),
                value: summary.error_rate,
                threshold: t.error_rate_warning,
                endpoint: None,
                recommendations: BottleneckKind::HighErrorRate.recommendations(),
            });
        }

        if let Some(rss_mb) = summary.system.rss_mb {
            if let Some(severity) = grade(rss_mb, t.rss_warning_mb, t.rss_critical_mb) {
                found.push(Bottleneck {
                    kind: BottleneckKind::HighMemory,
                    severity,
                    description: format!("Resident memory is {} MB", rss_mb),
                    value: rss_mb,
                    threshold: t.rss_warning_mb,
                    endpoint: None,
                    recommendations: BottleneckKind::HighMemory.recommendations(),
                });
            }
        }

        if let Some(load) = summary.system.load_per_cpu() {
            if let Some(severity) = grade(load, t.load_per_cpu_warning, t.load_per_cpu_critical) {
                let load = round2(load);
                found.push(Bottleneck {
                    kind: BottleneckKind::HighCpuLoad,
                    severity,
                    description: format!("Load average per CPU is {}", load),
                    value: load,
                    threshold: t.load_per_cpu_warning,
                    endpoint: None,
                    recommendations: BottleneckKind::HighCpuLoad.recommendations(),
                });
            }
        }

        let p99 = summary.response_time.p99;
        if p99 >= t.p99_warning_ms {
            found.push(Bottleneck {
                kind: BottleneckKind::TailLatency,
                severity: Severity::Low,
                description: format!("Overall p99 latency is {} ms", p99),
                value: p99,
                threshold: t.p99_warning_ms,
                endpoint: None,
                recommendations: BottleneckKind::TailLatency.recommendations(),
            });
        }

        found.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.value.total_cmp(&a.value))
        });

        let penalty: u32 = found.iter().map(|b| b.severity.weight()).sum();
        BottleneckReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            health_score: 100u32.saturating_sub(penalty),
            bottlenecks: found,
        }
    }

    /// Past reports, newest first
    pub fn history(&self, limit: usize) -> Vec<BottleneckReport> {
        self.reports.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn latest(&self) -> Option<BottleneckReport> {
        self.reports.read().back().cloned()
    }
}

impl Default for BottleneckAnalyzer {
    fn default() -> Self {
        Self::new(BottleneckThresholds::default())
    }
}

fn grade(value: f64, warning: f64, critical: f64) -> Option<Severity> {
    if value >= critical {
        Some(Severity::Critical)
    } else if value >= (warning + critical) / 2.0 {
        Some(Severity::High)
    } else if value >= warning {
        Some(Severity::Medium)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{PerformanceMonitor, RequestSample};

    fn summary_with(samples: &[(&str, u16, f64)]) -> PerformanceSummary {
        let monitor = PerformanceMonitor::new();
        for (endpoint, status, duration_ms) in samples {
            monitor.record(RequestSample {
                timestamp: Utc::now(),
                method: "GET".into(),
                endpoint: endpoint.to_string(),
                status: *status,
                duration_ms: *duration_ms,
            });
        }
        let mut summary = monitor.compute_summary(300, Utc::now());
        // Keep host readings out of the picture
        summary.system.rss_mb = Some(64.0);
        summary.system.load_average = Some(0.0);
        summary
    }

    #[test]
    fn test_grade() {
        assert_eq!(grade(400.0, 500.0, 1000.0), None);
        assert_eq!(grade(500.0, 500.0, 1000.0), Some(Severity::Medium));
        assert_eq!(grade(800.0, 500.0, 1000.0), Some(Severity::High));
        assert_eq!(grade(1000.0, 500.0, 1000.0), Some(Severity::Critical));
    }

    #[test]
    fn test_healthy_summary() {
        let analyzer = BottleneckAnalyzer::default();
        let report = analyzer.analyze(&summary_with(&[("/fast", 200, 10.0)]));
        assert!(report.bottlenecks.is_empty());
        assert_eq!(report.health_score, 100);
    }

    #[test]
    fn test_detects_and_orders_bottlenecks() {
        let analyzer = BottleneckAnalyzer::default();
        let report = analyzer.analyze(&summary_with(&[
            ("/slow", 200, 1200.0),
            ("/medium", 200, 600.0),
            ("/fast", 200, 10.0),
        ]));

        let kinds: Vec<_> = report.bottlenecks.iter().map(|b| (b.kind, b.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (BottleneckKind::SlowEndpoint, Severity::Critical),
                (BottleneckKind::SlowEndpoint, Severity::Medium),
            ]
        );
        assert_eq!(report.bottlenecks[0].endpoint.as_deref(), Some("/slow"));
        assert_eq!(report.health_score, 60);
        assert_eq!(
            report.most_severe(BottleneckKind::SlowEndpoint),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_error_rate_and_memory() {
        let analyzer = BottleneckAnalyzer::default();
        let mut summary = summary_with(&[("/a", 500, 5.0), ("/a", 200, 5.0)]);
        summary.system.rss_mb = Some(2048.0);

        let report = analyzer.analyze(&summary);
        assert_eq!(report.most_severe(BottleneckKind::HighErrorRate), Some(Severity::Critical));
        assert_eq!(report.most_severe(BottleneckKind::HighMemory), Some(Severity::Critical));
        assert_eq!(report.health_score, 40);
    }

    #[test]
    fn test_history_is_bounded() {
        let analyzer = BottleneckAnalyzer::default();
        let summary = summary_with(&[]);
        let mut last = None;
        for _ in 0..(REPORT_HISTORY + 5) {
            last = Some(analyzer.analyze(&summary).id);
        }
        assert_eq!(analyzer.history(usize::MAX).len(), REPORT_HISTORY);
        assert_eq!(analyzer.latest().map(|r| r.id), last);
        assert_eq!(analyzer.history(1)[0].id, last.unwrap());
    }
}

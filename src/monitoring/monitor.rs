use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::system::SystemSnapshot;
use crate::data::ValidationError;
use crate::stats::{round2, Distribution};

pub const DEFAULT_SAMPLE_CAPACITY: usize = 10_000;
pub const DEFAULT_WINDOW_SECS: u64 = 300;
/// Longest summary window a client may ask for, 7 days
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Requested summary window, defaulting to `DEFAULT_WINDOW_SECS`
pub fn window_secs(requested: Option<u64>) -> Result<u64, ValidationError> {
    match requested {
        None => Ok(DEFAULT_WINDOW_SECS),
        Some(secs) if secs <= MAX_WINDOW_SECS => Ok(secs),
        Some(_) => Err(ValidationError::Invalid {
            field: "window_secs",
            reason: format!("must be at most {}", MAX_WINDOW_SECS),
        }),
    }
}

/// One handled HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Route template, e.g. `/api/metrics/:id`
    pub endpoint: String,
    pub status: u16,
    pub duration_ms: f64,
}

impl RequestSample {
    pub fn is_error(&self) -> bool {
        self.status >= 500
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeStats {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub requests_per_minute: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub method: String,
    pub endpoint: String,
    pub count: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
    /// Percentage of 5xx responses
    pub error_rate: f64,
}

/// Rolled-up view of recent traffic and the host, the object alert rules read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub generated_at: DateTime<Utc>,
    pub window_secs: u64,
    pub requests: usize,
    pub response_time: ResponseTimeStats,
    /// Percentage of 5xx responses
    pub error_rate: f64,
    pub throughput: ThroughputStats,
    pub system: SystemSnapshot,
    pub endpoints: Vec<EndpointStats>,
}

/// Collects request samples and produces performance summaries
pub struct PerformanceMonitor {
    samples: RwLock<VecDeque<RequestSample>>,
    capacity: usize,
    started: Instant,
    total_requests: AtomicU64,
    active_requests: Arc<AtomicU64>,
    summary_cache: Cache<u64, Arc<PerformanceSummary>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY, Duration::from_secs(1))
    }

    /// `cache_ttl` bounds how stale a summary for the same window may be
    pub fn with_capacity(capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_SAMPLE_CAPACITY))),
            capacity: capacity.max(1),
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_requests: Arc::new(AtomicU64::new(0)),
            summary_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    /// Mark a request in flight until the guard drops
    pub fn begin_request(&self) -> ActiveRequestGuard {
        self.active_requests.fetch_add(1, Ordering::SeqCst);
        ActiveRequestGuard {
            active: Arc::clone(&self.active_requests),
        }
    }

    pub fn record(&self, sample: RequestSample) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut samples = self.samples.write();
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Most recent samples, newest first
    pub fn samples(&self, limit: usize) -> Vec<RequestSample> {
        self.samples.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.read().len()
    }

    /// Drop all samples and cached summaries
    pub fn reset(&self) -> usize {
        let cleared = {
            let mut samples = self.samples.write();
            let n = samples.len();
            samples.clear();
            n
        };
        self.summary_cache.invalidate_all();
        tracing::info!("Performance samples reset ({} cleared)", cleared);
        cleared
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn system_snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::capture(
            self.uptime_secs(),
            self.active_requests.load(Ordering::SeqCst),
            self.total_requests.load(Ordering::Relaxed),
        )
    }

    /// Summary over the last `window_secs`, served from cache when fresh
    pub fn summary(&self, window_secs: u64) -> Arc<PerformanceSummary> {
        let window_secs = window_secs.max(1);
        self.summary_cache
            .get_with(window_secs, || Arc::new(self.compute_summary(window_secs, Utc::now())))
    }

    /// Uncached summary over samples newer than `now - window_secs`
    pub fn compute_summary(&self, window_secs: u64, now: DateTime<Utc>) -> PerformanceSummary {
        // No representable cutoff means every sample is inside the window
        let cutoff = i64::try_from(window_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|window| now.checked_sub_signed(window));
        let recent: Vec<RequestSample> = self
            .samples
            .read()
            .iter()
            .filter(|s| cutoff.map_or(true, |cutoff| s.timestamp >= cutoff))
            .cloned()
            .collect();

        let latency = Distribution::from_samples(recent.iter().map(|s| s.duration_ms).collect());
        let errors = recent.iter().filter(|s| s.is_error()).count();

        // A young process has not observed a full window yet
        let observed_secs = window_secs.min(self.uptime_secs().max(1)).max(1);

        PerformanceSummary {
            generated_at: now,
            window_secs,
            requests: recent.len(),
            response_time: ResponseTimeStats {
                avg: round2(latency.avg),
                p50: round2(latency.p50),
                p95: round2(latency.p95),
                p99: round2(latency.p99),
                max: round2(latency.max),
            },
            error_rate: error_rate(errors, recent.len()),
            throughput: ThroughputStats {
                requests_per_minute: round2(recent.len() as f64 * 60.0 / observed_secs as f64),
            },
            system: self.system_snapshot(),
            endpoints: endpoint_stats(&recent),
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight request counter on drop
pub struct ActiveRequestGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn error_rate(errors: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(errors as f64 / total as f64 * 100.0)
    }
}

fn endpoint_stats(samples: &[RequestSample]) -> Vec<EndpointStats> {
    let mut groups: HashMap<(&str, &str), Vec<&RequestSample>> = HashMap::new();
    for sample in samples {
        groups
            .entry((sample.method.as_str(), sample.endpoint.as_str()))
            .or_default()
            .push(sample);
    }

    let mut stats: Vec<EndpointStats> = groups
        .into_iter()
        .map(|((method, endpoint), group)| {
            let latency = Distribution::from_samples(group.iter().map(|s| s.duration_ms).collect());
            let errors = group.iter().filter(|s| s.is_error()).count();
            EndpointStats {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                count: group.len(),
                avg_ms: round2(latency.avg),
                p95_ms: round2(latency.p95),
                error_rate: error_rate(errors, group.len()),
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.endpoint.cmp(&b.endpoint))
            .then_with(|| a.method.cmp(&b.method))
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(endpoint: &str, status: u16, duration_ms: f64) -> RequestSample {
        RequestSample {
            timestamp: Utc::now(),
            method: "GET".to_string(),
            endpoint: endpoint.to_string(),
            status,
            duration_ms,
        }
    }

    #[test]
    fn test_ring_buffer_capacity() {
        let monitor = PerformanceMonitor::with_capacity(3, Duration::from_secs(1));
        for i in 0..5 {
            monitor.record(sample("/a", 200, i as f64));
        }
        assert_eq!(monitor.sample_count(), 3);
        // newest first
        assert_eq!(monitor.samples(1)[0].duration_ms, 4.0);
    }

    #[test]
    fn test_summary_rates_and_endpoints() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..8 {
            monitor.record(sample("/api/metrics", 200, 10.0));
        }
        monitor.record(sample("/api/backup", 500, 100.0));
        monitor.record(sample("/api/backup", 200, 50.0));

        let summary = monitor.compute_summary(300, Utc::now());
        assert_eq!(summary.requests, 10);
        assert_eq!(summary.error_rate, 10.0);
        assert_eq!(summary.response_time.max, 100.0);
        assert_eq!(summary.endpoints.len(), 2);
        assert_eq!(summary.endpoints[0].endpoint, "/api/metrics");
        assert_eq!(summary.endpoints[1].error_rate, 50.0);
    }

    #[test]
    fn test_window_excludes_old_samples() {
        let monitor = PerformanceMonitor::new();
        let mut old = sample("/a", 200, 999.0);
        old.timestamp = Utc::now() - ChronoDuration::seconds(600);
        monitor.record(old);
        monitor.record(sample("/a", 200, 5.0));

        let summary = monitor.compute_summary(300, Utc::now());
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.response_time.max, 5.0);
    }

    #[test]
    fn test_huge_window_covers_all_samples() {
        let monitor = PerformanceMonitor::new();
        let mut old = sample("/a", 200, 999.0);
        old.timestamp = Utc::now() - ChronoDuration::days(365);
        monitor.record(old);
        monitor.record(sample("/a", 200, 5.0));

        for window in [MAX_WINDOW_SECS * 100, i64::MAX as u64, u64::MAX] {
            let summary = monitor.compute_summary(window, Utc::now());
            assert_eq!(summary.requests, 2);
            assert_eq!(summary.window_secs, window);
        }
    }

    #[test]
    fn test_window_param_bounds() {
        assert_eq!(window_secs(None).unwrap(), DEFAULT_WINDOW_SECS);
        assert_eq!(window_secs(Some(MAX_WINDOW_SECS)).unwrap(), MAX_WINDOW_SECS);
        assert!(matches!(
            window_secs(Some(MAX_WINDOW_SECS + 1)),
            Err(ValidationError::Invalid { field: "window_secs", .. })
        ));
        assert!(window_secs(Some(u64::MAX)).is_err());
    }

    #[test]
    fn test_active_request_guard() {
        let monitor = PerformanceMonitor::new();
        {
            let _a = monitor.begin_request();
            let _b = monitor.begin_request();
            assert_eq!(monitor.system_snapshot().active_requests, 2);
        }
        assert_eq!(monitor.system_snapshot().active_requests, 0);
    }

    #[test]
    fn test_reset_clears_cached_summary() {
        let monitor = PerformanceMonitor::new();
        monitor.record(sample("/a", 200, 5.0));
        assert_eq!(monitor.summary(60).requests, 1);

        assert_eq!(monitor.reset(), 1);
        assert_eq!(monitor.summary(60).requests, 0);
    }
}

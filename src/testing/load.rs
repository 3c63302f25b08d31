//! Virtual-user load simulation
//!
//! Each virtual user issues its requests sequentially. Latencies are drawn
//! from `base + U(0, jitter)` and each request fails with `failure_rate`
//! probability. Users run concurrently, so the simulated test duration is the
//! slowest user's total.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::ValidationError;
use crate::stats::{round2, Distribution};

pub const MAX_USERS: u32 = 1000;
pub const MAX_REQUESTS_PER_USER: u32 = 10_000;
/// Upper bound for any simulated latency or pause, one minute
pub const MAX_LATENCY_MS: f64 = 60_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    pub name: Option<String>,
    pub concurrent_users: u32,
    pub requests_per_user: u32,
    pub base_latency_ms: f64,
    pub latency_jitter_ms: f64,
    /// Probability in `[0, 1]` that a request fails
    pub failure_rate: f64,
    pub think_time_ms: f64,
    pub seed: Option<u64>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            name: None,
            concurrent_users: 10,
            requests_per_user: 10,
            base_latency_ms: 50.0,
            latency_jitter_ms: 25.0,
            failure_rate: 0.05,
            think_time_ms: 0.0,
            seed: None,
        }
    }
}

impl LoadTestConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_USERS).contains(&self.concurrent_users) {
            return Err(invalid("concurrent_users", format!("must be between 1 and {}", MAX_USERS)));
        }
        if !(1..=MAX_REQUESTS_PER_USER).contains(&self.requests_per_user) {
            return Err(invalid(
                "requests_per_user",
                format!("must be between 1 and {}", MAX_REQUESTS_PER_USER),
            ));
        }
        check_latency("base_latency_ms", self.base_latency_ms)?;
        check_latency("latency_jitter_ms", self.latency_jitter_ms)?;
        check_latency("think_time_ms", self.think_time_ms)?;
        check_probability("failure_rate", self.failure_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestResult {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percent
    pub error_rate: f64,
    pub duration_ms: f64,
    pub requests_per_second: f64,
    pub latency: Distribution,
}

struct UserOutcome {
    latencies: Vec<f64>,
    failures: u64,
    elapsed_ms: f64,
}

/// Run the simulation. `time_scale` multiplies real sleeping; `0.0` never sleeps.
pub async fn simulate(config: &LoadTestConfig, time_scale: f64) -> LoadTestResult {
    let users = (0..config.concurrent_users).map(|user| virtual_user(user, config, time_scale));
    let outcomes = join_all(users).await;

    let failed: u64 = outcomes.iter().map(|o| o.failures).sum();
    let duration_ms = outcomes.iter().map(|o| o.elapsed_ms).fold(0.0, f64::max);
    let latencies: Vec<f64> = outcomes.into_iter().flat_map(|o| o.latencies).collect();
    let total = latencies.len() as u64;

    let latency = Distribution::from_samples(latencies);
    LoadTestResult {
        total_requests: total,
        successful: total - failed,
        failed,
        error_rate: if total == 0 {
            0.0
        } else {
            round2(failed as f64 / total as f64 * 100.0)
        },
        duration_ms: round2(duration_ms),
        requests_per_second: if duration_ms > 0.0 {
            round2(total as f64 / (duration_ms / 1000.0))
        } else {
            0.0
        },
        latency: Distribution {
            avg: round2(latency.avg),
            min: round2(latency.min),
            max: round2(latency.max),
            p50: round2(latency.p50),
            p95: round2(latency.p95),
            p99: round2(latency.p99),
            ..latency
        },
    }
}

async fn virtual_user(user: u32, config: &LoadTestConfig, time_scale: f64) -> UserOutcome {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user as u64)),
        None => StdRng::from_entropy(),
    };

    let requests = config.requests_per_user as usize;
    let mut outcome = UserOutcome {
        latencies: Vec::with_capacity(requests),
        failures: 0,
        elapsed_ms: 0.0,
    };

    for i in 0..requests {
        let jitter = if config.latency_jitter_ms > 0.0 {
            rng.gen_range(0.0..=config.latency_jitter_ms)
        } else {
            0.0
        };
        let latency = config.base_latency_ms + jitter;
        if rng.gen_bool(config.failure_rate) {
            outcome.failures += 1;
        }

        let think = if i + 1 < requests { config.think_time_ms } else { 0.0 };
        outcome.latencies.push(latency);
        outcome.elapsed_ms += latency + think;

        let wait = (latency + think) * time_scale;
        if wait >= 1.0 {
            tokio::time::sleep(Duration::from_millis(wait as u64)).await;
        }
    }

    outcome
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        field,
        reason: reason.into(),
    }
}

pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a non-negative number"))
    }
}

pub(crate) fn check_latency(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_non_negative(field, value)?;
    if value > MAX_LATENCY_MS {
        return Err(invalid(field, format!("must be at most {}", MAX_LATENCY_MS)));
    }
    Ok(())
}

pub(crate) fn check_probability(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoadTestConfig {
        LoadTestConfig {
            concurrent_users: 20,
            requests_per_user: 50,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_totals_and_latency_bounds() {
        let result = simulate(&config(), 0.0).await;
        assert_eq!(result.total_requests, 1000);
        assert_eq!(result.successful + result.failed, 1000);
        assert!(result.latency.min >= 50.0);
        assert!(result.latency.max <= 75.0);
        assert!(result.latency.p50 <= result.latency.p95);
        assert!(result.requests_per_second > 0.0);
        // 5% default failure injection
        assert!(result.error_rate > 1.0 && result.error_rate < 10.0);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let a = tokio_test::block_on(simulate(&config(), 0.0));
        let b = tokio_test::block_on(simulate(&config(), 0.0));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_no_failures_no_jitter() {
        let cfg = LoadTestConfig {
            concurrent_users: 2,
            requests_per_user: 4,
            base_latency_ms: 10.0,
            latency_jitter_ms: 0.0,
            failure_rate: 0.0,
            think_time_ms: 5.0,
            seed: Some(1),
            ..Default::default()
        };
        let result = simulate(&cfg, 0.0).await;
        assert_eq!(result.failed, 0);
        assert_eq!(result.latency.avg, 10.0);
        // 4 requests plus 3 think pauses per user
        assert_eq!(result.duration_ms, 55.0);
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());
        let too_many = LoadTestConfig {
            concurrent_users: MAX_USERS + 1,
            ..config()
        };
        assert!(matches!(
            too_many.validate(),
            Err(ValidationError::Invalid { field: "concurrent_users", .. })
        ));
        let bad_rate = LoadTestConfig {
            failure_rate: 1.5,
            ..config()
        };
        assert!(bad_rate.validate().is_err());
    }

    #[test]
    fn test_latency_bounds() {
        let at_max = LoadTestConfig {
            base_latency_ms: MAX_LATENCY_MS,
            latency_jitter_ms: MAX_LATENCY_MS,
            think_time_ms: MAX_LATENCY_MS,
            ..config()
        };
        assert!(at_max.validate().is_ok());

        for huge in [MAX_LATENCY_MS + 1.0, 1e308, f64::INFINITY, f64::NAN] {
            let base = LoadTestConfig { base_latency_ms: huge, ..config() };
            let jitter = LoadTestConfig { latency_jitter_ms: huge, ..config() };
            let think = LoadTestConfig { think_time_ms: huge, ..config() };
            assert!(matches!(
                base.validate(),
                Err(ValidationError::Invalid { field: "base_latency_ms", .. })
            ));
            assert!(matches!(
                jitter.validate(),
                Err(ValidationError::Invalid { field: "latency_jitter_ms", .. })
            ));
            assert!(matches!(
                think.validate(),
                Err(ValidationError::Invalid { field: "think_time_ms", .. })
            ));
        }
    }
}

//! Stepped stress test: load phases with a rising user count until the error
//! rate crosses the threshold

use serde::{Deserialize, Serialize};

use super::load::{self, check_latency, check_probability, invalid, LoadTestConfig, LoadTestResult};
use crate::data::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressTestConfig {
    pub name: Option<String>,
    pub start_users: u32,
    pub max_users: u32,
    pub step_users: u32,
    pub requests_per_user: u32,
    pub base_latency_ms: f64,
    /// Users the simulated system serves before degrading
    pub capacity_users: u32,
    pub failure_rate: f64,
    /// Percent error rate that marks the breaking point
    pub error_threshold: f64,
    pub seed: Option<u64>,
}

impl Default for StressTestConfig {
    fn default() -> Self {
        Self {
            name: None,
            start_users: 10,
            max_users: 200,
            step_users: 10,
            requests_per_user: 10,
            base_latency_ms: 50.0,
            capacity_users: 100,
            failure_rate: 0.01,
            error_threshold: 10.0,
            seed: None,
        }
    }
}

impl StressTestConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_users == 0 {
            return Err(invalid("start_users", "must be at least 1"));
        }
        if self.max_users < self.start_users || self.max_users > load::MAX_USERS {
            return Err(invalid(
                "max_users",
                format!("must be between start_users and {}", load::MAX_USERS),
            ));
        }
        if self.step_users == 0 {
            return Err(invalid("step_users", "must be at least 1"));
        }
        if self.capacity_users == 0 {
            return Err(invalid("capacity_users", "must be at least 1"));
        }
        if !(1..=load::MAX_REQUESTS_PER_USER).contains(&self.requests_per_user) {
            return Err(invalid(
                "requests_per_user",
                format!("must be between 1 and {}", load::MAX_REQUESTS_PER_USER),
            ));
        }
        if !(0.0..=100.0).contains(&self.error_threshold) {
            return Err(invalid("error_threshold", "must be a percentage"));
        }
        check_latency("base_latency_ms", self.base_latency_ms)?;
        check_probability("failure_rate", self.failure_rate)
    }

    /// Load parameters for one phase at `users`
    fn phase(&self, index: u32, users: u32) -> LoadTestConfig {
        let capacity = self.capacity_users as f64;
        let overload = ((users as f64 - capacity) / capacity).max(0.0);
        let latency = self.base_latency_ms * (1.0 + users as f64 / capacity);

        LoadTestConfig {
            name: self.name.clone(),
            concurrent_users: users,
            requests_per_user: self.requests_per_user,
            base_latency_ms: latency,
            latency_jitter_ms: latency / 2.0,
            failure_rate: (self.failure_rate + overload).min(1.0),
            think_time_ms: 0.0,
            seed: self.seed.map(|s| s.wrapping_add(index as u64 * 10_000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressPhase {
    pub users: u32,
    pub result: LoadTestResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub phases: Vec<StressPhase>,
    /// User count of the first phase above the error threshold
    pub breaking_point_users: Option<u32>,
    /// Highest user count that stayed under the threshold
    pub max_stable_users: Option<u32>,
}

pub async fn simulate(config: &StressTestConfig, time_scale: f64) -> StressTestResult {
    let mut phases = Vec::new();
    let mut breaking_point_users = None;
    let mut max_stable_users = None;

    let mut users = config.start_users;
    let mut index = 0;
    while users <= config.max_users {
        let result = load::simulate(&config.phase(index, users), time_scale).await;
        let broke = result.error_rate > config.error_threshold;

        tracing::debug!(users, error_rate = result.error_rate, "Stress phase finished");
        phases.push(StressPhase { users, result });

        if broke {
            breaking_point_users = Some(users);
            break;
        }
        max_stable_users = Some(users);

        index += 1;
        users = match users.checked_add(config.step_users) {
            Some(next) => next,
            None => break,
        };
    }

    StressTestResult {
        phases,
        breaking_point_users,
        max_stable_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StressTestConfig {
        StressTestConfig {
            start_users: 20,
            max_users: 300,
            step_users: 20,
            capacity_users: 100,
            failure_rate: 0.0,
            error_threshold: 10.0,
            seed: Some(9),
            ..Default::default()
        }
    }

    #[test]
    fn test_phase_scaling() {
        let cfg = config();
        let under = cfg.phase(0, 50);
        assert_eq!(under.base_latency_ms, 75.0);
        assert_eq!(under.failure_rate, 0.0);

        let over = cfg.phase(1, 150);
        assert_eq!(over.base_latency_ms, 125.0);
        assert_eq!(over.failure_rate, 0.5);
    }

    #[tokio::test]
    async fn test_finds_breaking_point_past_capacity() {
        let result = simulate(&config(), 0.0).await;

        let breaking = result.breaking_point_users.unwrap();
        assert!(breaking > 100, "broke at {}", breaking);
        assert!(breaking <= 140);
        assert_eq!(result.phases.last().unwrap().users, breaking);
        assert_eq!(result.max_stable_users, Some(breaking - 20));

        // latency rises with load
        let first = &result.phases[0].result.latency;
        let last = &result.phases.last().unwrap().result.latency;
        assert!(last.avg > first.avg);
    }

    #[tokio::test]
    async fn test_no_breaking_point_within_capacity() {
        let cfg = StressTestConfig {
            max_users: 100,
            ..config()
        };
        let result = simulate(&cfg, 0.0).await;
        assert_eq!(result.breaking_point_users, None);
        assert_eq!(result.phases.len(), 5);
        assert_eq!(result.max_stable_users, Some(100));
    }

    #[tokio::test]
    async fn test_max_latency_stays_finite_under_overload() {
        let cfg = StressTestConfig {
            start_users: load::MAX_USERS,
            max_users: load::MAX_USERS,
            requests_per_user: 1,
            base_latency_ms: load::MAX_LATENCY_MS,
            capacity_users: 1,
            ..config()
        };
        assert!(cfg.validate().is_ok());

        let result = simulate(&cfg, 0.0).await;
        let latency = &result.phases[0].result.latency;
        assert!(latency.max.is_finite());
        assert!(latency.min >= load::MAX_LATENCY_MS);

        let too_slow = StressTestConfig {
            base_latency_ms: 1e308,
            ..config()
        };
        assert!(matches!(
            too_slow.validate(),
            Err(ValidationError::Invalid { field: "base_latency_ms", .. })
        ));
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());
        let bad = StressTestConfig {
            max_users: 10,
            ..config()
        };
        assert!(bad.validate().is_err());
    }
}

//! Allocation churn test
//!
//! Every iteration allocates a batch of blocks against a [`MemoryTracker`]
//! and releases all but `retain_ratio` of them. A healthy pattern returns to
//! near zero; steady retention shows up as growth per iteration.

use serde::{Deserialize, Serialize};

use super::load::{check_probability, invalid};
use crate::data::ValidationError;
use crate::storage::{MemoryStats, MemoryTracker};

const LEAK_RATIO: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTestConfig {
    pub name: Option<String>,
    pub iterations: u32,
    pub blocks_per_iteration: u32,
    pub allocation_kb: u32,
    /// Fraction of each iteration's blocks kept alive
    pub retain_ratio: f64,
    pub limit_mb: u32,
}

impl Default for MemoryTestConfig {
    fn default() -> Self {
        Self {
            name: None,
            iterations: 50,
            blocks_per_iteration: 8,
            allocation_kb: 256,
            retain_ratio: 0.0,
            limit_mb: 256,
        }
    }
}

impl MemoryTestConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=10_000).contains(&self.iterations) {
            return Err(invalid("iterations", "must be between 1 and 10000"));
        }
        if !(1..=1024).contains(&self.blocks_per_iteration) {
            return Err(invalid("blocks_per_iteration", "must be between 1 and 1024"));
        }
        if !(1..=65_536).contains(&self.allocation_kb) {
            return Err(invalid("allocation_kb", "must be between 1 and 65536"));
        }
        if !(1..=4096).contains(&self.limit_mb) {
            return Err(invalid("limit_mb", "must be between 1 and 4096"));
        }
        check_probability("retain_ratio", self.retain_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTestResult {
    pub iterations_completed: u32,
    pub peak_bytes: usize,
    pub final_bytes: usize,
    pub growth_per_iteration_bytes: f64,
    pub leak_suspected: bool,
    pub limit_exceeded: bool,
}

/// Blocking; run off the async executor
pub fn simulate(config: &MemoryTestConfig) -> (MemoryTestResult, MemoryStats) {
    let tracker = MemoryTracker::new(config.limit_mb as usize * 1024 * 1024);
    let block_bytes = config.allocation_kb as usize * 1024;
    let blocks = config.blocks_per_iteration as usize;
    let keep = ((blocks as f64) * config.retain_ratio).round() as usize;

    let mut retained: Vec<Vec<u8>> = Vec::new();
    let mut iterations_completed = 0;
    let mut limit_exceeded = false;

    for iteration in 0..config.iterations {
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(blocks);
        for _ in 0..blocks {
            if !tracker.try_allocate(block_bytes) {
                limit_exceeded = true;
                break;
            }
            // Filled so the pages are actually committed
            batch.push(vec![iteration as u8; block_bytes]);
        }

        let keep = keep.min(batch.len());
        for block in batch.drain(keep..) {
            tracker.free(block.len());
        }
        retained.append(&mut batch);

        if limit_exceeded {
            tracing::warn!(iteration, limit_mb = config.limit_mb, "Memory test hit its limit");
            break;
        }
        iterations_completed += 1;
    }

    let final_bytes = tracker.current();
    let stats = MemoryStats::from(&tracker);
    drop(retained);

    let result = MemoryTestResult {
        iterations_completed,
        peak_bytes: tracker.peak(),
        final_bytes,
        growth_per_iteration_bytes: if iterations_completed == 0 {
            0.0
        } else {
            crate::stats::round2(final_bytes as f64 / iterations_completed as f64)
        },
        leak_suspected: final_bytes as f64 > tracker.peak() as f64 * LEAK_RATIO,
        limit_exceeded,
    };
    (result, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MemoryTestConfig {
        MemoryTestConfig {
            iterations: 20,
            blocks_per_iteration: 4,
            allocation_kb: 16,
            retain_ratio: 0.0,
            limit_mb: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_retention_no_leak() {
        let (result, stats) = simulate(&config());
        assert_eq!(result.iterations_completed, 20);
        assert_eq!(result.final_bytes, 0);
        assert_eq!(result.peak_bytes, 4 * 16 * 1024);
        assert!(!result.leak_suspected);
        assert!(!result.limit_exceeded);
        assert_eq!(stats.current_bytes, 0);
    }

    #[test]
    fn test_retention_flags_leak() {
        let (result, _) = simulate(&MemoryTestConfig {
            retain_ratio: 0.25,
            ..config()
        });
        // one block of 16 KiB kept per iteration
        assert_eq!(result.final_bytes, 20 * 16 * 1024);
        assert_eq!(result.growth_per_iteration_bytes, 16.0 * 1024.0);
        assert!(result.leak_suspected);
    }

    #[test]
    fn test_limit_exceeded() {
        let (result, _) = simulate(&MemoryTestConfig {
            iterations: 100,
            allocation_kb: 256,
            retain_ratio: 1.0,
            limit_mb: 2,
            ..config()
        });
        assert!(result.limit_exceeded);
        assert_eq!(result.iterations_completed, 2);
        assert!(result.peak_bytes <= 2 * 1024 * 1024);
    }
}

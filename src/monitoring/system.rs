//! Process and host readings from `/proc`
//!
//! Every reading is optional; on platforms without procfs the snapshot simply
//! carries fewer fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub cpu_count: usize,
    /// One-minute load average
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_mb: Option<f64>,
    pub active_requests: u64,
    pub total_requests: u64,
}

impl SystemSnapshot {
    pub fn capture(uptime_secs: u64, active_requests: u64, total_requests: u64) -> Self {
        let rss_bytes = read_rss_bytes();
        Self {
            timestamp: Utc::now(),
            uptime_secs,
            cpu_count: num_cpus::get(),
            load_average: read_load_average(),
            rss_bytes,
            rss_mb: rss_bytes.map(|b| crate::stats::round2(b as f64 / (1024.0 * 1024.0))),
            active_requests,
            total_requests,
        }
    }

    /// Load average divided by CPU count
    pub fn load_per_cpu(&self) -> Option<f64> {
        let load = self.load_average?;
        (self.cpu_count > 0).then(|| load / self.cpu_count as f64)
    }
}

fn read_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn read_load_average() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    parse_load_average(&loadavg)
}

/// Parse the `VmRSS:  1234 kB` line of `/proc/<pid>/status`
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

fn parse_load_average(loadavg: &str) -> Option<f64> {
    loadavg.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tpulseboard\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(2048 * 1024));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
    }

    #[test]
    fn test_parse_load_average() {
        assert_eq!(parse_load_average("0.52 0.41 0.30 1/123 4567\n"), Some(0.52));
        assert_eq!(parse_load_average(""), None);
    }

    #[test]
    fn test_load_per_cpu() {
        let mut snapshot = SystemSnapshot::capture(1, 0, 0);
        snapshot.cpu_count = 4;
        snapshot.load_average = Some(2.0);
        assert_eq!(snapshot.load_per_cpu(), Some(0.5));
    }
}

//! Descriptive statistics over f64 samples

use serde::{Deserialize, Serialize};

/// Percentile over an ascending slice, taking the sample at the rounded
/// index `p / 100 * (len - 1)`. No interpolation. `p` is clamped to `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Sort in place, treating NaN as equal
pub fn sort_f64(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

/// Distribution summary of a set of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Distribution {
    /// Build from unsorted samples. Empty input yields all zeros.
    pub fn from_samples(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        sort_f64(&mut values);

        let sum: f64 = values.iter().sum();
        Self {
            count: values.len(),
            avg: sum / values.len() as f64,
            min: values[0],
            max: values[values.len() - 1],
            p50: percentile(&values, 50.0).unwrap_or(0.0),
            p95: percentile(&values, 95.0).unwrap_or(0.0),
            p99: percentile(&values, 99.0).unwrap_or(0.0),
        }
    }
}

/// Round to two decimals for presentation
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(51.0));
        assert_eq!(percentile(&values, 100.0), Some(100.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_percentile_rounds_index() {
        let values = [10.0, 20.0, 30.0, 40.0];
        // index 1.5 rounds up, 0.75 rounds to 1
        assert_eq!(percentile(&values, 50.0), Some(30.0));
        assert_eq!(percentile(&values, 25.0), Some(20.0));
        assert_eq!(percentile(&values, 95.0), Some(40.0));
        assert_eq!(percentile(&values, 150.0), Some(40.0));
        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
    }

    #[test]
    fn test_distribution() {
        let dist = Distribution::from_samples(vec![30.0, 10.0, 20.0]);
        assert_eq!(dist.count, 3);
        assert_eq!(dist.min, 10.0);
        assert_eq!(dist.max, 30.0);
        assert_eq!(dist.avg, 20.0);
        assert_eq!(dist.p50, 20.0);
    }

    #[test]
    fn test_empty_distribution() {
        assert_eq!(Distribution::from_samples(Vec::new()), Distribution::default());
    }
}

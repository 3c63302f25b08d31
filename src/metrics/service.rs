use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::data::{Metric, NewMetric, ValidationError};
use crate::stats::{percentile, round2, sort_f64};
use crate::storage::Repository;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;
/// Widest series bucket, 366 days
pub const MAX_BUCKET_SECS: i64 = 366 * 24 * 3600;

/// Filters shared by listing, summaries and series
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl MetricQuery {
    pub fn matches(&self, metric: &Metric) -> bool {
        self.entity_type
            .as_deref()
            .map_or(true, |t| metric.entity_type == t)
            && self.entity_id.as_deref().map_or(true, |id| metric.entity_id == id)
            && self.name.as_deref().map_or(true, |n| metric.name == n)
            && self.since.map_or(true, |since| metric.timestamp >= since)
            && self.until.map_or(true, |until| metric.timestamp <= until)
    }

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT).clamp(1, MAX_QUERY_LIMIT)
    }
}

/// One page of metrics, newest first
#[derive(Debug, Clone, Serialize)]
pub struct MetricPage {
    pub data: Vec<Metric>,
    /// Matches before paging
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub inserted: usize,
    pub errors: Vec<BatchItemError>,
}

/// Aggregate over every metric sharing a name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    /// Value of the most recent observation
    pub latest: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Records and queries business metrics
pub struct MetricService {
    repository: Arc<Repository>,
}

impl MetricService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub fn record(&self, input: NewMetric) -> Result<Metric, MetricError> {
        let metric = input.into_metric(Utc::now())?;
        tracing::debug!(
            metric_id = %metric.id,
            name = %metric.name,
            entity = %metric.entity_id,
            "Metric recorded"
        );
        self.repository.insert_metric(metric.clone());
        Ok(metric)
    }

    /// Record many metrics; invalid items are reported and skipped
    pub fn record_batch(&self, inputs: Vec<NewMetric>) -> BatchResult {
        let now = Utc::now();
        let mut inserted = 0;
        let mut errors = Vec::new();

        for (index, input) in inputs.into_iter().enumerate() {
            match input.into_metric(now) {
                Ok(metric) => {
                    self.repository.insert_metric(metric);
                    inserted += 1;
                }
                Err(e) => errors.push(BatchItemError {
                    index,
                    message: e.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            tracing::warn!("Metric batch skipped {} invalid items", errors.len());
        }

        BatchResult { inserted, errors }
    }

    pub fn get(&self, id: &Uuid) -> Result<Metric, MetricError> {
        self.repository
            .get_metric(id)
            .ok_or(MetricError::NotFound(*id))
    }

    pub fn delete(&self, id: &Uuid) -> Result<Metric, MetricError> {
        self.repository
            .remove_metric(id)
            .ok_or(MetricError::NotFound(*id))
    }

    pub fn query(&self, query: &MetricQuery) -> MetricPage {
        let mut matches = self.repository.metrics_where(|m| query.matches(m));
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len();
        let limit = query.effective_limit();
        let data = matches.into_iter().skip(query.offset).take(limit).collect();

        MetricPage {
            data,
            total,
            limit,
            offset: query.offset,
        }
    }

    /// Per-name aggregates over matching metrics, sorted by name
    pub fn summary(&self, query: &MetricQuery) -> Vec<MetricSummary> {
        let mut groups: HashMap<String, Vec<Metric>> = HashMap::new();
        for metric in self.repository.metrics_where(|m| query.matches(m)) {
            groups.entry(metric.name.clone()).or_default().push(metric);
        }

        let mut summaries: Vec<MetricSummary> = groups
            .into_iter()
            .map(|(name, metrics)| summarize(name, &metrics))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Time-bucketed aggregates for one metric name, ascending by bucket
    pub fn series(
        &self,
        name: &str,
        bucket_secs: i64,
        query: &MetricQuery,
    ) -> Result<Vec<SeriesPoint>, MetricError> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        let bucket_ms = match bucket_secs.checked_mul(1000) {
            Some(ms) if (1..=MAX_BUCKET_SECS).contains(&bucket_secs) => ms,
            _ => {
                return Err(ValidationError::Invalid {
                    field: "bucket_secs",
                    reason: format!("must be between 1 and {}", MAX_BUCKET_SECS),
                }
                .into())
            }
        };
        let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for metric in self
            .repository
            .metrics_where(|m| m.name == name && query.matches(m))
        {
            let ts = metric.timestamp.timestamp_millis();
            let bucket = ts.div_euclid(bucket_ms) * bucket_ms;
            buckets.entry(bucket).or_default().push(metric.value);
        }

        Ok(buckets
            .into_iter()
            .filter_map(|(bucket, values)| {
                let bucket_start = Utc.timestamp_millis_opt(bucket).single()?;
                let sum: f64 = values.iter().sum();
                Some(SeriesPoint {
                    bucket_start,
                    count: values.len(),
                    sum,
                    avg: round2(sum / values.len() as f64),
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                })
            })
            .collect())
    }
}

fn summarize(name: String, metrics: &[Metric]) -> MetricSummary {
    let mut values: Vec<f64> = metrics.iter().map(|m| m.value).collect();
    let sum: f64 = values.iter().sum();
    sort_f64(&mut values);

    let newest = metrics.iter().max_by_key(|m| m.timestamp);

    MetricSummary {
        name,
        count: values.len(),
        sum,
        avg: round2(sum / values.len() as f64),
        min: values.first().copied().unwrap_or(0.0),
        max: values.last().copied().unwrap_or(0.0),
        p95: percentile(&values, 95.0).unwrap_or(0.0),
        latest: newest.map(|m| m.value).unwrap_or(0.0),
        unit: metrics.iter().find_map(|m| m.unit.clone()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Metric not found: {0}")]
    NotFound(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> MetricService {
        MetricService::new(Arc::new(Repository::new()))
    }

    fn at(minutes_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes_ago)
    }

    #[test]
    fn test_record_and_get() {
        let svc = service();
        let metric = svc
            .record(NewMetric::new("customer", "c-42", "orders.count", 7.0))
            .unwrap();

        assert_eq!(svc.get(&metric.id).unwrap().value, 7.0);
        svc.delete(&metric.id).unwrap();
        assert!(matches!(svc.get(&metric.id), Err(MetricError::NotFound(_))));
    }

    #[test]
    fn test_batch_skips_invalid() {
        let svc = service();
        let result = svc.record_batch(vec![
            NewMetric::new("customer", "c-1", "orders.count", 1.0),
            NewMetric::new("customer", "", "orders.count", 1.0),
            NewMetric::new("customer", "c-2", "orders.count", 2.0),
        ]);

        assert_eq!(result.inserted, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 1);
    }

    #[test]
    fn test_query_filters_and_pages_newest_first() {
        let svc = service();
        for i in 0..5 {
            svc.record(NewMetric::new("deal", "d-1", "deal.value", i as f64).with_timestamp(at(i)))
                .unwrap();
        }
        svc.record(NewMetric::new("deal", "d-2", "deal.value", 99.0)).unwrap();

        let page = svc.query(&MetricQuery {
            entity_id: Some("d-1".into()),
            limit: Some(2),
            offset: 1,
            ..Default::default()
        });

        assert_eq!(page.total, 5);
        assert_eq!(page.data.len(), 2);
        // offset 1 skips the newest (value 0.0)
        assert_eq!(page.data[0].value, 1.0);
        assert_eq!(page.data[1].value, 2.0);
    }

    #[test]
    fn test_summary_groups_by_name() {
        let svc = service();
        for v in [10.0, 20.0, 30.0] {
            svc.record(NewMetric::new("workflow", "wf", "run.duration", v).with_unit("ms"))
                .unwrap();
        }
        svc.record(NewMetric::new("workflow", "wf", "run.errors", 1.0)).unwrap();

        let summary = svc.summary(&MetricQuery::default());
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "run.duration");
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[0].avg, 20.0);
        assert_eq!(summary[0].min, 10.0);
        assert_eq!(summary[0].max, 30.0);
        assert_eq!(summary[0].unit.as_deref(), Some("ms"));
        assert_eq!(summary[1].name, "run.errors");
    }

    #[test]
    fn test_series_buckets() {
        let svc = service();
        let base = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        for (offset, value) in [(0, 1.0), (30, 3.0), (70, 10.0)] {
            svc.record(
                NewMetric::new("workflow", "wf", "queue.depth", value)
                    .with_timestamp(base + Duration::seconds(offset)),
            )
            .unwrap();
        }

        let series = svc.series("queue.depth", 60, &MetricQuery::default()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].count, 2);
        assert_eq!(series[0].avg, 2.0);
        assert_eq!(series[1].max, 10.0);

        assert!(svc.series("queue.depth", 0, &MetricQuery::default()).is_err());
    }

    #[test]
    fn test_series_bucket_bounds() {
        let svc = service();
        svc.record(NewMetric::new("workflow", "wf", "queue.depth", 4.0)).unwrap();

        let widest = svc
            .series("queue.depth", MAX_BUCKET_SECS, &MetricQuery::default())
            .unwrap();
        assert_eq!(widest.len(), 1);

        for bucket_secs in [-1, MAX_BUCKET_SECS + 1, i64::MAX / 1000 + 1, i64::MAX, i64::MIN] {
            assert!(matches!(
                svc.series("queue.depth", bucket_secs, &MetricQuery::default()),
                Err(MetricError::Validation(ValidationError::Invalid { field: "bucket_secs", .. }))
            ));
        }
    }
}

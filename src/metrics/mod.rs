//! Business metrics: recording, filtered listing, per-name summaries and
//! time-bucketed series.

pub mod service;

pub use service::{
    BatchItemError, BatchResult, MetricError, MetricPage, MetricQuery, MetricService,
    MetricSummary, SeriesPoint,
};

//! Domain records stored by the repository

pub mod archive;
pub mod execution;
pub mod metric;
pub mod severity;

pub use archive::{ArchiveSource, DataArchive};
pub use execution::{AutomationExecution, ExecutionStatus, NewExecution};
pub use metric::{Metric, NewMetric};
pub use severity::Severity;

/// Input validation failures, reported to clients as 400
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

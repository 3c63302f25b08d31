//! Pulseboard: analytics and automation dashboard backend
//!
//! Stores business metrics and automation executions in memory, watches its
//! own HTTP performance, and turns what it sees into alerts, bottleneck
//! reports and optimization recommendations.
//!
//! # Features
//!
//! - **Metrics**: record, query, summarize and bucket metric series
//! - **Automation executions**: lifecycle tracking with retries
//! - **Retention**: expired records move into restorable archives
//! - **Backups**: LZ4-compressed snapshots on disk, scheduled or on demand
//! - **Performance monitoring**: per-request samples and rolling summaries
//! - **Alerting**: threshold rules with cooldowns and webhook notification
//! - **Bottleneck analysis** and a catalog of simulated optimizations
//! - **Simulated load, stress and memory tests**
//!
//! # Example
//!
//! ```no_run
//! use pulseboard::data::NewMetric;
//! use pulseboard::metrics::{MetricQuery, MetricService};
//! use pulseboard::storage::Repository;
//! use std::sync::Arc;
//!
//! let service = MetricService::new(Arc::new(Repository::new()));
//! service
//!     .record(NewMetric {
//!         entity_type: "dashboard".to_string(),
//!         entity_id: "sales".to_string(),
//!         name: "revenue".to_string(),
//!         value: Some(1250.0),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let page = service.query(&MetricQuery::default());
//! println!("{} metrics", page.total);
//! ```

pub mod alerts;
pub mod api;
pub mod automation;
pub mod bottleneck;
pub mod config;
pub mod data;
pub mod metrics;
pub mod monitoring;
pub mod optimization;
pub mod retention;
pub mod stats;
pub mod storage;
pub mod testing;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use data::{AutomationExecution, DataArchive, Metric, Severity};
pub use storage::{BackupManager, Repository};

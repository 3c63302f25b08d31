//! Performance monitoring
//!
//! Request samples are pushed by the HTTP tracking middleware into a bounded
//! ring buffer. Summaries roll them up together with a host snapshot; the
//! summary's JSON form is what alert rules and bottleneck analysis read.

pub mod monitor;
pub mod system;

pub use monitor::{
    ActiveRequestGuard, EndpointStats, PerformanceMonitor, PerformanceSummary, RequestSample,
    ResponseTimeStats, ThroughputStats, DEFAULT_WINDOW_SECS, MAX_WINDOW_SECS,
};
pub use monitor::window_secs;
pub use system::SystemSnapshot;

//! Threshold alerting over the live performance summary
//!
//! Rules name a dot path into the summary JSON; firing produces a
//! [`PerformanceAlert`] that moves through active, acknowledged, resolved
//! and dismissed.

pub mod checker;
pub mod config;
pub mod manager;
pub mod notifier;

pub use checker::AlertChecker;
pub use config::{AlertRule, AlertRuleInput, AlertStatus, Comparator, NotifyTarget, PerformanceAlert};
pub use manager::{AlertError, AlertFilter, AlertManager};
pub use notifier::{Notifier, NotifierError};

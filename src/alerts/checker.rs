//! Background alert checker

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::interval;

use super::config::PerformanceAlert;
use super::manager::AlertManager;
use super::notifier::Notifier;
use crate::monitoring::PerformanceMonitor;

/// Periodically evaluates alert rules against a fresh performance summary
pub struct AlertChecker {
    manager: Arc<AlertManager>,
    monitor: Arc<PerformanceMonitor>,
    notifier: Notifier,
    /// Summary window the rules are evaluated over
    window_secs: u64,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl AlertChecker {
    pub fn new(manager: Arc<AlertManager>, monitor: Arc<PerformanceMonitor>, window_secs: u64) -> Self {
        Self {
            manager,
            monitor,
            notifier: Notifier::new(),
            window_secs,
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<AlertManager> {
        &self.manager
    }

    /// Evaluate all rules once and notify the targets of every fired alert
    pub async fn check_once(&self) -> Vec<PerformanceAlert> {
        let now = Utc::now();
        let summary = self.monitor.compute_summary(self.window_secs, now);
        let summary = match serde_json::to_value(&summary) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize performance summary");
                return Vec::new();
            }
        };

        let fired = self.manager.evaluate(&summary, now);

        for alert in &fired {
            let Some(rule) = self.manager.rule(&alert.rule_id) else {
                continue;
            };
            if let Err(e) = self.notifier.notify(alert, &rule.targets).await {
                tracing::error!(
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }

        fired
    }

    pub fn start(self: Arc<Self>, check_interval: Duration) -> tokio::task::JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        tokio::spawn(async move {
            tracing::info!("Alert checker started with interval {:?}", check_interval);
            let mut ticker = interval(check_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Alert checker shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub async fn stop(&self) {
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
    }
}

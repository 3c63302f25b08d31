//! Delivers fired alerts to their rule's targets

use std::collections::HashMap;
use std::time::Duration;

use super::config::{NotifyTarget, PerformanceAlert};

pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Send to every target, collecting failures
    pub async fn notify(
        &self,
        alert: &PerformanceAlert,
        targets: &[NotifyTarget],
    ) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in targets {
            if let Err(e) = self.notify_target(alert, target).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    async fn notify_target(
        &self,
        alert: &PerformanceAlert,
        target: &NotifyTarget,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    alert_id = %alert.id,
                    rule = %alert.rule_name,
                    severity = %alert.severity,
                    "Alert: {}",
                    alert.message
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => self.send_webhook(alert, url, headers).await,
        }
    }

    async fn send_webhook(
        &self,
        alert: &PerformanceAlert,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let mut request = self.client.post(url).json(alert);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(alert_id = %alert.id, url = %url, "Webhook notification sent");
        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}

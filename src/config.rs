//! Server configuration from `PULSEBOARD_*` environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::retention::RetentionPolicy;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HS256 secret; `None` leaves the API unauthenticated
    pub jwt_secret: Option<String>,
    pub jwt_ttl_secs: u64,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub data_dir: PathBuf,
    /// Seconds per replenished rate-limit token
    pub rate_limit_per_second: u64,
    /// `0` disables rate limiting
    pub rate_limit_burst: u32,
    pub metric_retention_days: i64,
    pub execution_retention_days: i64,
    pub archive_retention_days: i64,
    pub retention_interval_secs: u64,
    pub alert_interval_secs: u64,
    /// `0` disables scheduled backups
    pub backup_interval_secs: u64,
    pub max_backups: usize,
    /// Multiplier on simulated optimization and test delays; `0` runs them instantly
    pub simulation_time_scale: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: None,
            jwt_ttl_secs: 3600,
            admin_user: None,
            admin_password: None,
            data_dir: PathBuf::from("./pulseboard_data"),
            rate_limit_per_second: 1,
            rate_limit_burst: 100,
            metric_retention_days: 90,
            execution_retention_days: 30,
            archive_retention_days: 365,
            retention_interval_secs: 3600,
            alert_interval_secs: 30,
            backup_interval_secs: 0,
            max_backups: 10,
            simulation_time_scale: 1.0,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: text("PULSEBOARD_HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PULSEBOARD_PORT", defaults.port)?,
            jwt_secret: text("PULSEBOARD_JWT_SECRET"),
            jwt_ttl_secs: parse(&lookup, "PULSEBOARD_JWT_TTL_SECS", defaults.jwt_ttl_secs)?,
            admin_user: text("PULSEBOARD_ADMIN_USER"),
            admin_password: text("PULSEBOARD_ADMIN_PASSWORD"),
            data_dir: text("PULSEBOARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            rate_limit_per_second: parse(
                &lookup,
                "PULSEBOARD_RATE_LIMIT_PER_SECOND",
                defaults.rate_limit_per_second,
            )?,
            rate_limit_burst: parse(&lookup, "PULSEBOARD_RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
            metric_retention_days: parse(
                &lookup,
                "PULSEBOARD_METRIC_RETENTION_DAYS",
                defaults.metric_retention_days,
            )?,
            execution_retention_days: parse(
                &lookup,
                "PULSEBOARD_EXECUTION_RETENTION_DAYS",
                defaults.execution_retention_days,
            )?,
            archive_retention_days: parse(
                &lookup,
                "PULSEBOARD_ARCHIVE_RETENTION_DAYS",
                defaults.archive_retention_days,
            )?,
            retention_interval_secs: parse(
                &lookup,
                "PULSEBOARD_RETENTION_INTERVAL_SECS",
                defaults.retention_interval_secs,
            )?,
            alert_interval_secs: parse(
                &lookup,
                "PULSEBOARD_ALERT_INTERVAL_SECS",
                defaults.alert_interval_secs,
            )?,
            backup_interval_secs: parse(
                &lookup,
                "PULSEBOARD_BACKUP_INTERVAL_SECS",
                defaults.backup_interval_secs,
            )?,
            max_backups: parse(&lookup, "PULSEBOARD_MAX_BACKUPS", defaults.max_backups)?,
            simulation_time_scale: parse(
                &lookup,
                "PULSEBOARD_SIMULATION_TIME_SCALE",
                defaults.simulation_time_scale,
            )?,
        })
    }

    pub fn auth_enabled(&self) -> bool {
        self.jwt_secret.is_some()
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            metric_retention: ChronoDuration::days(self.metric_retention_days),
            execution_retention: ChronoDuration::days(self.execution_retention_days),
            archive_retention: ChronoDuration::days(self.archive_retention_days),
        }
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs.max(1))
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_secs.max(1))
    }

    pub fn backup_interval(&self) -> Option<Duration> {
        (self.backup_interval_secs > 0).then(|| Duration::from_secs(self.backup_interval_secs))
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw })
        }
        _ => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.auth_enabled());
        assert_eq!(config.rate_limit_burst, 100);
        assert!(config.backup_interval().is_none());
        assert_eq!(config.retention_policy().metric_retention, ChronoDuration::days(90));
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("PULSEBOARD_PORT", "9090"),
            ("PULSEBOARD_JWT_SECRET", "s3cret"),
            ("PULSEBOARD_BACKUP_INTERVAL_SECS", "600"),
            ("PULSEBOARD_DATA_DIR", "/var/lib/pulseboard"),
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert!(config.auth_enabled());
        assert_eq!(config.backup_interval(), Some(Duration::from_secs(600)));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/pulseboard"));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = from_map(&[("PULSEBOARD_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PULSEBOARD_PORT", .. }));

        // blank values fall back to defaults
        assert_eq!(from_map(&[("PULSEBOARD_PORT", " ")]).unwrap().port, 8080);
    }
}

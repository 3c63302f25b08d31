//! Pulseboard Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PULSEBOARD_HOST: Bind address (default: 0.0.0.0)
//! - PULSEBOARD_PORT: Port number (default: 8080)
//! - PULSEBOARD_JWT_SECRET: Enables bearer-token auth on /api routes
//! - PULSEBOARD_ADMIN_USER / PULSEBOARD_ADMIN_PASSWORD: Credentials for POST /api/auth/token
//! - PULSEBOARD_DATA_DIR: Backup directory (default: ./pulseboard_data)
//! - PULSEBOARD_RATE_LIMIT_BURST: Requests per IP before throttling, 0 disables (default: 100)
//! - PULSEBOARD_BACKUP_INTERVAL_SECS: Scheduled backups, 0 disables (default: 0)
//! - RUST_LOG: Log level (default: info)
//!
//! See `ServerConfig` for the full list.

use pulseboard::api::run_server;
use pulseboard::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulseboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!("Pulseboard configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Data directory: {}", config.data_dir.display());
    tracing::info!(
        "  Retention: metrics {}d, executions {}d, archives {}d (checked every {}s)",
        config.metric_retention_days,
        config.execution_retention_days,
        config.archive_retention_days,
        config.retention_interval_secs
    );
    tracing::info!("  Alert check interval: {} seconds", config.alert_interval_secs);
    match config.backup_interval() {
        Some(interval) => tracing::info!(
            "  Scheduled backups: every {:?}, keeping {}",
            interval,
            config.max_backups
        ),
        None => tracing::info!("  Scheduled backups: DISABLED"),
    }
    tracing::info!(
        "  Authentication: {}",
        if config.auth_enabled() { "JWT" } else { "DISABLED" }
    );

    println!(
        r#"
  ___      _         _                      _
 | _ \_  _| |___ ___| |__  ___  __ _ _ _ __| |
 |  _/ || | (_-</ -_) '_ \/ _ \/ _` | '_/ _` |
 |_|  \_,_|_/__/\___|_.__/\___/\__,_|_| \__,_|

 Analytics, Automation & Performance Dashboard
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}

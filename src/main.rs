//! Composition root: loads configuration from the environment, wires the
//! worker fleet, and runs until the process is signalled to stop.
//!
//! Configuration loading/validation and the HTTP serving surface are
//! explicit external collaborators; this binary only does enough env
//! parsing to stand the pipeline up for local/container use.

use std::sync::Arc;

use playscout_runtime::config::StreamDescriptor;
use playscout_runtime::logging::{init_logging, LoggingConfig};
use playscout_runtime::PipelineConfig;
use playscout_store::db::{create_pool, DatabaseConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = load_config();

    init_logging(LoggingConfig::default()).expect("logging already initialized");

    info!(streams = config.streams.len(), db_path = %config.db_path, "starting playscout");

    if let Err(err) = config.validate() {
        error!(%err, "invalid pipeline configuration");
        std::process::exit(1);
    }

    let pool = match create_pool(DatabaseConfig::new(&config.db_path)).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(%err, "failed to open database pool and run migrations");
            std::process::exit(1);
        }
    };

    let manager = Arc::new(playscout_pipeline::WorkerManager::new(config, pool));

    if let Err(err) = manager.start_all().await {
        error!(%err, "failed to start worker fleet");
        std::process::exit(1);
    }

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, stopping worker fleet");
    if let Err(err) = manager.stop_all().await {
        error!(%err, "error while stopping worker fleet");
    }
}

/// Reads everything [`PipelineConfig`] needs from the environment, falling
/// back to its defaults for anything unset. `PLAYSCOUT_STREAMS` is a
/// semicolon-separated `name=url` list.
fn load_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Ok(db_path) = std::env::var("PLAYSCOUT_DB_PATH") {
        config.db_path = db_path;
    }

    if let Ok(api_key) = std::env::var("PLAYSCOUT_ACOUSTID_API_KEY") {
        config.acoustid_enabled = true;
        config.acoustid_api_key = Some(api_key);
    }

    if let Ok(streams) = std::env::var("PLAYSCOUT_STREAMS") {
        config.streams = streams
            .split(';')
            .filter_map(|entry| entry.split_once('='))
            .map(|(name, url)| StreamDescriptor::new(name.trim(), url.trim()))
            .collect();
    }

    config
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

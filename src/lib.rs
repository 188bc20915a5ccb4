pub mod commands;
pub mod dashboard;
pub mod dates;
pub mod db;
pub mod errors;
pub mod models;
pub mod notifications;
pub mod redaction;
pub mod scheduler;
pub mod stats;

use crate::commands::AppState;
use crate::dashboard::DashboardCore;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub const DATA_DIR_ENV: &str = "TELECOM_DESK_DATA_DIR";

/// Opens the store, starts the expiration scan and retention loops and
/// blocks until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    let data_dir = default_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    init_tracing(&data_dir).map_err(anyhow::Error::msg)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let core = DashboardCore::new(data_dir)?;
        let state = AppState::new(core);

        state.core.notifications().start_background_service();
        tracing::info!(data_dir = %state.core.data_dir().display(), "telecom desk started");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;

        state.core.notifications().stop_background_service();
        tracing::info!("telecom desk stopped");
        Ok::<(), anyhow::Error>(())
    })
}

/// `TELECOM_DESK_DATA_DIR`, else `~/.telecom-desk`, else the working directory.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".telecom-desk"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "telecom-desk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

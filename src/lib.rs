pub mod types;
pub mod error;
pub mod config;
pub mod score;
pub mod bracket;
pub mod progression;
pub mod standings;
pub mod swiss;
pub mod predictions;
pub mod store;
pub mod stage_commands;
pub mod server;
mod graph;

use types::*;
use config::*;
use error::ServiceError;

use std::{
    fs,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── Entry point ────────────────────────────────────────────────────────

pub async fn run() -> Result<(), ServiceError> {
    load_env_file();
    let config = load_config_inner().unwrap_or_else(|e| {
        eprintln!("config.json unreadable ({e}); using defaults");
        apply_env_defaults(AppConfig::default())
    });

    // Initialize tracing with a daily rolling file
    let logs_dir = log_dir(&config);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "tourney.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Tourney engine starting");
    log_env_warnings(&config);

    let store = match StageStore::bootstrap(data_dir(&config)) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to load stages: {e}");
            return Err(e);
        }
    };
    info!("{} stage(s) loaded", store.stages.len());
    let store: SharedStageStore = Arc::new(Mutex::new(store));

    let addr = if config.bind_addr.parse::<SocketAddr>().is_ok() {
        config.bind_addr.clone()
    } else {
        DEFAULT_BIND_ADDR.to_string()
    };
    server::start_stage_server(store, &addr).await
}

pub mod api; // HTTP form + JSON endpoints
pub mod config;
pub mod core_state; // Shared models, store and log
pub mod hardware;
pub mod pipeline; // Embedding → prompt → findings
pub mod report; // PDF, CSV log, storage

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ServerError;
use crate::config::{ConfigError, ReportConfig};
use crate::core_state::{AppContext, CoreError};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Signal handling failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Load config and models, serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("cxr-report starting v{}", config::APP_VERSION);

    let config = ReportConfig::load()?;
    let device = hardware::resolve_device(config.models.device);

    // Model loading is blocking and can take several seconds
    let ctx = tokio::task::spawn_blocking(move || AppContext::load(config, device))
        .await
        .map_err(|e| std::io::Error::other(format!("Model loading task failed: {e}")))??;
    let ctx = Arc::new(ctx);

    let mut server = api::start_report_server(ctx).await?;
    tracing::info!("Open http://{} in a browser", server.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    server.shutdown();
    server.stopped().await;
    Ok(())
}

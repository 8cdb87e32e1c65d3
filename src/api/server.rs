//! Report server lifecycle.
//!
//! bind → spawn `axum::serve` in a background task → return a handle with a
//! shutdown channel. The handle can then be awaited until the server drains.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::report_router;
use crate::config::ConfigError;
use crate::core_state::AppContext;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind report server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Handle to a running report server.
pub struct ReportServer {
    addr: SocketAddr,
    started_at: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReportServer {
    /// Address actually bound (resolves port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// Signal graceful shutdown. In-flight requests finish first.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Report server shutdown signal sent");
        }
    }

    /// Wait for the serve task to exit.
    pub async fn stopped(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Report server task failed: {e}");
            }
        }
    }
}

/// Start on the configured `server.bind` address.
pub async fn start_report_server(ctx: Arc<AppContext>) -> Result<ReportServer, ServerError> {
    let addr = ctx.config().server.bind_addr()?;
    start_report_server_on(ctx, addr).await
}

/// Start on an explicit address. Port 0 picks an ephemeral port.
pub async fn start_report_server_on(
    ctx: Arc<AppContext>,
    addr: SocketAddr,
) -> Result<ReportServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;

    let app = report_router(ctx);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Report server received shutdown signal");
        };

        tracing::info!(%addr, "Report server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Report server error: {e}");
        }

        tracing::info!("Report server stopped");
    });

    Ok(ReportServer {
        addr,
        started_at: chrono::Utc::now().to_rfc3339(),
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

//! HTTP surface of the ledger.
//!
//! - `GET  /health`
//! - `POST /user/:user_id/transaction` (requires a `Source-Type` header)
//! - `GET  /user/:user_id/balance`

pub mod handlers;
mod middleware;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::application::LedgerService;

pub use middleware::REQUEST_ID_HEADER;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub service: LedgerService,
    /// Deployment environment reported by /health
    pub env: String,
}

impl ApiState {
    pub fn new(service: LedgerService, env: impl Into<String>) -> Self {
        Self {
            service,
            env: env.into(),
        }
    }
}

/// Build the application router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/user/:user_id/transaction", post(handlers::create_transaction))
        .route("/user/:user_id/balance", get(handlers::get_user_balance))
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, then give in-flight requests up to
/// `shutdown_timeout` to finish.
pub async fn serve(listener: TcpListener, state: ApiState, shutdown_timeout: Duration) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });
    info!(%addr, "server started");

    tokio::select! {
        joined = &mut server => {
            joined.context("Server task panicked")?.context("Server error")?;
            return Ok(());
        }
        signal = shutdown_signal() => {
            info!(signal, "shutdown signal received");
        }
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(shutdown_timeout, &mut server).await {
        Ok(joined) => joined.context("Server task panicked")?.context("Server error")?,
        Err(_) => {
            warn!(?shutdown_timeout, "in-flight requests still running, aborting");
            server.abort();
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

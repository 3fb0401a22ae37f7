//! HTTP server hosting the routes.
//!
//! Owns the host side of the connection lifecycle: serve until a shutdown
//! signal arrives, let in-flight requests drain, then shut the database down.

use crate::db::ConnectionManager;
use crate::error::DbResult;
use crate::routes::{AppState, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// How long in-flight requests get to finish after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpServer {
    database: Arc<ConnectionManager>,
    host: String,
    port: u16,
}

impl HttpServer {
    /// Create a new HTTP server.
    ///
    /// # Arguments
    ///
    /// * `database` - Connection manager already started by the caller
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    pub fn new(database: Arc<ConnectionManager>, host: impl Into<String>, port: u16) -> Self {
        Self {
            database,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until SIGINT/SIGTERM, then shut the connection manager down.
    ///
    /// The database is shut down even when binding or serving fails.
    pub async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let result = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!(addr = %bind_addr, "HTTP server listening");
                self.serve(listener).await
            }
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind");
                Err(e.into())
            }
        };

        info!("Closing database connections");
        self.database.shutdown().await;

        result
    }

    async fn serve(&self, listener: TcpListener) -> DbResult<()> {
        let app = router(AppState::new(Arc::clone(&self.database)));

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server draining normally vs forced timeout/second signal
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(e.into());
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

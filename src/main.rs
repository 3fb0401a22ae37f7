//! Simple App Server - Main entry point.
//!
//! Starts the database connection manager, serves the JSON API, and shuts the
//! database down once traffic has drained.

use clap::Parser;
use simple_app::config::Config;
use simple_app::db::ConnectionManager;
use simple_app::models::ConnectionConfig;
use simple_app::server::HttpServer;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config, sql_echo: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if sql_echo {
        if let Ok(directive) = "sqlx::query=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();
    let db_config = ConnectionConfig::from_env(&Default::default());

    // Initialize logging
    init_tracing(&config, db_config.echo);

    info!(
        database = ?db_config.summary(),
        "Starting simple-app-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let database = Arc::new(ConnectionManager::new(db_config));

    if let Err(e) = database.startup().await {
        error!(
            error = %e,
            retryable = e.is_retryable(),
            suggestion = e.suggestion().unwrap_or_default(),
            "Database startup failed"
        );
        return Err(e.into());
    }

    if config.create_schemas {
        info!(tables = database.registry().len(), "Creating registered tables");
        if let Err(e) = database.create_all().await {
            error!(
                error = %e,
                suggestion = e.suggestion().unwrap_or_default(),
                "Schema creation failed"
            );
            database.shutdown().await;
            return Err(e.into());
        }
    }

    let server = HttpServer::new(Arc::clone(&database), &config.http_host, config.http_port);
    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

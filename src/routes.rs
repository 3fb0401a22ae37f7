//! HTTP routes.
//!
//! Static JSON endpoints plus a database readiness check built on
//! [`ConnectionManager::ping`].

use crate::db::ConnectionManager;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

/// Shared state for request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub database: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(database: Arc<ConnectionManager>) -> Self {
        Self { database }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/health", get(health))
        .route("/health/db", get(database_health))
        .route("/josh", get(read_josh))
        .with_state(state)
}

async fn read_root() -> Json<Value> {
    Json(json!({ "message": "Hello from simple-app-server" }))
}

/// Process liveness; does not touch the database.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn read_josh() -> Json<Value> {
    Json(json!({ "message": "Hello Josh" }))
}

async fn database_health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let alive = match state.database.ping().await {
        Ok(alive) => alive,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    let lifecycle = state.database.state().await;

    if alive {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": true, "state": lifecycle })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "database": false, "state": lifecycle })),
        )
    }
}

//! Health and liveness handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub storage: &'static str,
}

pub async fn root() -> &'static str {
    "Patronaje Marketplace API v1"
}

/// Liveness check, never touches dependencies
pub async fn liveness() -> &'static str {
    "OK"
}

/// Readiness: database and upload directory. 503 when either is down.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "disconnected"
        }
    };

    let storage = if state.storage.is_available().await {
        "available"
    } else {
        tracing::warn!("Upload directory is not available");
        "unavailable"
    };

    let healthy = database == "connected" && storage == "available";
    let (code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
            storage,
        }),
    )
}

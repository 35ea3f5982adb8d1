// src/handlers/health.rs

use axum::{Json, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

/// Liveness probe. Does not touch the store.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

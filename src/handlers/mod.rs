// src/handlers/mod.rs

use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

pub mod admin;
pub mod attempts;
pub mod auth;
pub mod health;
pub mod sets;
pub mod taxonomy;

/// Success envelope: `{success: true, data}`.
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
    }))
}

/// Success envelope with a human-readable message.
pub fn ok_with_message<T: Serialize>(message: impl Into<String>, data: T) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message.into(),
        "data": data,
    }))
}

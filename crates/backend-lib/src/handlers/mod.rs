// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers. Every body is wrapped in the `ApiResponse` envelope.
use axum::{extract::FromRequest, Json};
use scholarflow_common::ApiResponse;
use serde::Serialize;

use crate::error::AppError;

pub mod admin;
pub mod auth;
pub mod establishments;
pub mod profile;

/// `Json` whose rejections render as validation errors in the envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

pub(crate) fn envelope<T: Serialize>(data: T, message: &str) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data).with_message(message))
}

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Envelope-shaped 404 for unknown routes
pub async fn not_found() -> AppError {
    AppError::NotFound("route".to_string())
}

//! HTTP handlers

pub mod auth;

use actix_web::HttpResponse;
use serde_json::json;

/// Liveness probe.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "auth-service",
    }))
}

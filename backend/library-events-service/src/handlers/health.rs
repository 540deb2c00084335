use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

/// Endpoint: GET /health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.repo.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "connections": state.registry.total_connections(),
        })),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": e.to_string(),
            }))
        }
    }
}

/// Push stream and connection status endpoints
///
/// The stream stays open until the client disconnects; dropping the body
/// unsubscribes the connection.
use actix_web::{http::header, web, HttpResponse};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::middleware::AuthenticatedUser;
use crate::push::PushStream;
use crate::state::AppState;

/// Endpoint: GET /api/v1/events/stream
pub async fn event_stream(user: AuthenticatedUser, state: web::Data<AppState>) -> HttpResponse {
    let stream = PushStream::open(&state.registry, user.id, user.role);
    tracing::debug!(
        user_id = %user.id,
        connection_id = %stream.handle().id.as_uuid(),
        "push stream opened"
    );

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream)
}

/// Caller's own connection count
///
/// Endpoint: GET /api/v1/events/status
pub async fn connection_status(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let connection_count = state.registry.connection_count(user.id);

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user.id.to_string(),
        "connected": connection_count > 0,
        "connection_count": connection_count
    })))
}

/// Endpoint: GET /api/v1/events/metrics
pub async fn connection_metrics(state: web::Data<AppState>) -> Result<HttpResponse> {
    let total_connections = state.registry.total_connections();
    let connected_users = state.registry.connected_users_count();

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "average_connections_per_user": if connected_users > 0 {
            total_connections as f64 / connected_users as f64
        } else {
            0.0
        }
    })))
}

/// Users holding at least one connection; admins only
///
/// Endpoint: GET /api/v1/events/users
pub async fn connected_users(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("admin role required".into()));
    }

    let users = state.registry.connected_user_ids();
    Ok(HttpResponse::Ok().json(json!({
        "count": users.len(),
        "users": users,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/events")
            .route("/stream", web::get().to(event_stream))
            .route("/status", web::get().to(connection_status))
            .route("/metrics", web::get().to(connection_metrics))
            .route("/users", web::get().to(connected_users)),
    );
}

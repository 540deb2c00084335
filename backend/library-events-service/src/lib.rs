pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod push;
pub mod repository;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use push::{ConnectionRegistry, PushEvent};
pub use services::{EventFanout, MembershipResolver, VisibilityTracker, VisibilityTransition};
pub use state::AppState;

use actix_web::web;

/// Every route the service exposes, shared by `main` and the HTTP tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .configure(handlers::register_events)
        .configure(handlers::register_collections);
}

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use library_events_service::repository::{
    InMemoryLibraryRepository, LibraryRepository, PostgresLibraryRepository,
};
use library_events_service::{configure, logging, AppState, Config};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

async fn build_repository(config: &Config) -> anyhow::Result<Arc<dyn LibraryRepository>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, collections are kept in memory");
        return Ok(Arc::new(InMemoryLibraryRepository::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    let repo = PostgresLibraryRepository::new(pool);
    repo.migrate().await.context("failed to run migrations")?;
    Ok(Arc::new(repo))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    logging::init_tracing(config.log_format);

    tracing::info!("Starting library-events-service");

    let repo = build_repository(&config).await?;
    let state = AppState::new(repo, &config);

    let heartbeat = state.registry.spawn_heartbeat(config.heartbeat_interval());

    let addr = config.bind_address();
    tracing::info!("Starting HTTP server on {}:{}", addr.0, addr.1);

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(TracingLogger::default())
            .configure(configure)
    })
    .bind(addr)?
    .run()
    .await?;

    heartbeat.abort();
    tracing::info!(
        open_connections = state.registry.total_connections(),
        "library-events-service stopped"
    );
    Ok(())
}

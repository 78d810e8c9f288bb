//! Storyloom API server entry point.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use sqlx::postgres::PgPoolOptions;
use storyloom_api::config::AppConfig;
use storyloom_api::error::AppError;
use storyloom_api::routes;
use storyloom_api::state::AppState;
use storyloom_core::clock::{Clock, SystemClock};
use storyloom_core::rng::{DeterministicRng, SeededRng};
use storyloom_core::store::StoryStore;
use storyloom_progression::application::orchestrator::Orchestrator;
use storyloom_progression::application::rehydrator;
use storyloom_store::pg_story_store::PgStoryStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Storyloom API server");

    let config = AppConfig::from_env()?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Build the engine and restore timers for deadlines stored by a previous run.
    let store: Arc<dyn StoryStore> = Arc::new(PgStoryStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(SeededRng::from_os()));
    let engine = Orchestrator::new(store, clock, rng, config.progression.clone());
    let report = rehydrator::rehydrate(&engine).await?;
    tracing::info!(?report, "startup rehydration finished");

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::app_router(AppState::new(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

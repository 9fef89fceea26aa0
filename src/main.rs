use dotenv::dotenv;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod db;
mod errors;
mod routes;
mod services;
mod utils;

use db::{init_db, run_migrations};
use services::flow_registry::{FlowRegistry, SWEEP_INTERVAL};
use services::gemini::GeminiService;
use services::realtime::ChangeHub;
use utils::config::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv().ok();

    // Setup tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ConsultAI server...");

    let config = Config::from_env()?;

    // Initialize DB - server will not start if it fails
    tracing::info!("Connecting to database...");
    let pool = init_db(&config).await?;
    tracing::info!("✅ Database connected successfully");

    run_migrations(&pool).await?;

    let gemini = GeminiService::new(&config.gemini_api_key)?;

    // Row change feed for realtime mirrors
    let changes = ChangeHub::default();
    changes.spawn_listener(&pool).await?;

    // Unfinished consultations, swept when idle
    let flows = Arc::new(FlowRegistry::new(config.flow_idle_timeout));
    flows.spawn_sweeper(SWEEP_INTERVAL);

    let bind_addr = config.bind_addr;

    // Shared application state
    let app_state = AppState {
        db: Arc::new(pool),
        gemini: Arc::new(gemini),
        changes,
        flows,
        config: Arc::new(config),
    };

    let app = routes::create_router(app_state);

    // Run server
    tracing::info!("🌐 Server running on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

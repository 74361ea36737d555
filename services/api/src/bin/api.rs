//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenRouterAdapter, PasswordAuthAdapter},
    config::Config,
    error::ApiError,
    web::{build_router, AppState},
};
use flashcards_core::generation::{GenerationService, GenerationSettings};
use flashcards_core::memory::InMemoryDatabase;
use flashcards_core::ports::{ChatCompletionService, DatabaseService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_store() {
        warn!("DATABASE_URL is memory://; data will not survive a restart");
        Arc::new(InMemoryDatabase::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    // --- 3. Initialize Service Adapters ---
    let ai: Option<Arc<dyn ChatCompletionService>> = match config.openrouter_api_key.as_deref() {
        Some(key) => {
            let adapter = OpenRouterAdapter::new(
                key,
                config.openrouter_base_url.clone(),
                config.generation_model.clone(),
            )
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .with_app_info(
                format!("http://{}", config.bind_address),
                "Flashcards",
            );
            info!(model = %config.generation_model, "OpenRouter client configured");
            let adapter: Arc<dyn ChatCompletionService> = Arc::new(adapter);
            Some(adapter)
        }
        None => {
            warn!("OPENROUTER_API_KEY is not set; generation requests will answer 503");
            None
        }
    };
    let generation = GenerationService::new(
        ai,
        GenerationSettings {
            model: config.generation_model.clone(),
            ..GenerationSettings::default()
        },
    );
    let auth = Arc::new(PasswordAuthAdapter::new(
        db.clone(),
        chrono::Duration::days(config.auth_session_ttl_days),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        auth,
        generation,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = build_router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

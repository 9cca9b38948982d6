//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, DbSessionProvider, FileKvStore, OpenAiReasoningAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use chitchat_core::{
    auth::AuthService,
    cache::{MemoryKvStore, UserQueryCache},
    friends::FriendService,
    ports::{DatabaseService, KeyValueStore},
    routing::RoutingPolicy,
    session::SessionOrchestrator,
    summary::{SummaryCache, SummaryGenerator},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

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
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");
    let db: Arc<dyn DatabaseService> = db_adapter;

    // --- 3. Initialize Reasoning Providers ---
    let api_key = config
        .openai_api_key
        .as_ref()
        .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?;
    let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
    let fallback_client = match &config.fallback_api_base {
        Some(base) => Client::with_config(OpenAIConfig::new().with_api_key(api_key).with_api_base(base)),
        None => openai_client.clone(),
    };

    let routing_primary = Arc::new(OpenAiReasoningAdapter::new(
        openai_client.clone(),
        config.routing_model.clone(),
    ));
    let summary_primary = Arc::new(OpenAiReasoningAdapter::new(
        openai_client.clone(),
        config.summary_model.clone(),
    ));
    let fallback = Arc::new(OpenAiReasoningAdapter::new(
        fallback_client,
        config.fallback_model.clone(),
    ));

    // --- 4. Build the Core Services ---
    let kv_store: Arc<dyn KeyValueStore> = Arc::new(FileKvStore::open(&config.kv_store_path)?);
    let summary_cache = SummaryCache::new(kv_store);
    let sessions = Arc::new(DbSessionProvider::new(db.clone()));
    let users = Arc::new(UserQueryCache::new());

    let app_state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        sessions: sessions.clone(),
        users: users.clone(),
        auth: Arc::new(AuthService::new(db.clone())),
        friends: Arc::new(FriendService::new(db.clone(), summary_cache.clone())),
        router: Arc::new(
            RoutingPolicy::new(routing_primary, fallback.clone()).with_timeout(config.reasoning_timeout),
        ),
        summaries: Arc::new(
            SummaryGenerator::new(summary_primary, fallback, summary_cache)
                .with_timeout(config.reasoning_timeout),
        ),
    });

    // --- 5. Drop Cached Profiles on Every Session Change ---
    // The listener runs until `_session_watch` is dropped when the server stops.
    let watcher = SessionOrchestrator::new(
        sessions.clone(),
        db.clone(),
        Arc::new(MemoryKvStore::new()),
        users.clone(),
    );
    let _session_watch = watcher.watch();

    // --- 6. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-user-id"),
        ]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

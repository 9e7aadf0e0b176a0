//! Labtrack Server - laboratory inventory and circulation
//!
//! REST API server over PostgreSQL (or an in-memory store for development).

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labtrack_server::{
    api,
    circulation::SystemClock,
    config::{AppConfig, LoggingConfig, OtpStoreKind},
    repository::{ChallengeStore, CirculationStore, MemoryChallengeStore, MemoryRepository, PgRepository},
    services::{
        email::EmailNotifier,
        notifier::{LogNotifier, Notifier},
        redis::RedisChallengeStore,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    tracing::info!("Starting Labtrack Server v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn CirculationStore> = if config.database.is_memory() {
        tracing::warn!("Using the in-memory store; all data is lost on shutdown");
        Arc::new(MemoryRepository::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;
        tracing::info!("Connected to database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations completed");

        Arc::new(PgRepository::new(pool))
    };

    let challenges: Arc<dyn ChallengeStore> = match config.otp.store {
        OtpStoreKind::Redis => {
            let store = RedisChallengeStore::new(&config.redis.url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        OtpStoreKind::Memory => Arc::new(MemoryChallengeStore::new()),
    };

    let notifier: Arc<dyn Notifier> = if config.email.enabled {
        Arc::new(EmailNotifier::new(config.email.clone()))
    } else {
        tracing::info!("Email disabled; notifications are only logged");
        Arc::new(LogNotifier)
    };

    let services = Services::new(store, challenges, notifier, Arc::new(SystemClock), &config);

    if config.sweep.interval_seconds > 0 {
        services
            .sweep
            .clone()
            .spawn(Duration::from_secs(config.sweep.interval_seconds));
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("labtrack_server={},tower_http=debug", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Inventory
        .route("/items", get(api::items::list_items).post(api::items::create_item))
        .route(
            "/items/:id",
            get(api::items::get_item)
                .put(api::items::update_item)
                .delete(api::items::delete_item),
        )
        .route("/items/:id/quantity", put(api::items::adjust_quantity))
        .route("/items/:id/holds", post(api::items::hold_for_service))
        .route("/items/:id/holds/release", post(api::items::release_from_service))
        // Borrowings
        .route(
            "/borrowings",
            get(api::borrowings::list_borrowings).post(api::borrowings::submit_borrowing),
        )
        .route("/borrowings/:id", get(api::borrowings::get_borrowing))
        .route("/borrowings/:id/decision", post(api::borrowings::decide_borrowing))
        .route("/borrowings/:id/release", post(api::borrowings::release_borrowing))
        .route("/borrowings/:id/cancel", post(api::borrowings::cancel_borrowing))
        .route("/borrowings/:id/return", post(api::returns::submit_return))
        // Returns
        .route("/returns/:id", get(api::returns::get_return))
        .route("/returns/:id/decision", post(api::returns::decide_return))
        .route("/returns/:id/payment", post(api::returns::record_payment))
        // Disposals
        .route("/disposals", post(api::disposals::submit_disposal))
        .route("/disposals/:id", get(api::disposals::get_disposal))
        .route("/disposals/:id/decision", post(api::disposals::decide_disposal))
        // Guest requests
        .route("/guest/otp/send", post(api::guest::send_otp))
        .route("/guest/otp/verify", post(api::guest::verify_otp))
        .route("/guest/borrowings", post(api::guest::submit_guest_borrowing))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
}

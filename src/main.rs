//! Darshan Server - temple visit booking and crowd monitoring
//!
//! REST API server with live status streaming.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darshan_server::{
    api,
    config::{AppConfig, StorageBackend},
    repository::{MemoryStore, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("darshan_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Darshan Server v{}", env!("CARGO_PKG_VERSION"));

    let repository = match config.database.backend {
        StorageBackend::Postgres => {
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
            Repository::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Repository::in_memory(Arc::new(MemoryStore::with_demo_temple().await))
        }
    };

    let services = Services::new(repository, &config);

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

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Temples
        .route("/temples/:id/status", get(api::temples::get_status))
        .route("/temples/:id/stream", get(api::temples::stream))
        // Slots
        .route("/slots", get(api::slots::list_slots).post(api::slots::create_slot))
        .route("/slots/bulk", post(api::slots::bulk_create_slots))
        .route(
            "/slots/:id",
            get(api::slots::get_slot)
                .put(api::slots::update_slot)
                .delete(api::slots::delete_slot),
        )
        .route("/slots/:id/availability", get(api::slots::check_availability))
        // Bookings
        .route(
            "/bookings",
            get(api::bookings::list_bookings).post(api::bookings::create_booking),
        )
        .route("/bookings/qr/:booking_id", get(api::bookings::get_qr))
        .route("/bookings/:id", get(api::bookings::get_booking))
        .route("/bookings/:id/cancel", put(api::bookings::cancel_booking))
        .route("/bookings/:id/checkin", put(api::bookings::check_in))
        .route("/bookings/:id/checkout", put(api::bookings::check_out))
        // Simulation
        .route("/simulation/:temple_id", get(api::simulation::get_simulation))
        .route("/simulation/:temple_id/heatmap", get(api::simulation::get_heatmap))
        .route("/simulation/:temple_id/update", post(api::simulation::update_simulation))
        .route("/simulation/:temple_id/alert", post(api::simulation::add_alert))
        .route(
            "/simulation/:temple_id/alert/:alert_id/resolve",
            put(api::simulation::resolve_alert),
        )
        // Waiting times
        .route("/waiting-times/estimate", post(api::waiting_times::estimate))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

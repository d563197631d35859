pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use srs_core::{
    BacklogThresholds, InMemoryStore, ModeConfig, ModeController, ReviewStore, Scheduler,
    SessionOrchestrator,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::PgReviewStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    /// Wire the scheduling core to `store` with the configured limits.
    pub fn new(store: Arc<dyn ReviewStore>, config: &Config) -> anyhow::Result<Self> {
        let modes = ModeController::new(
            ModeConfig {
                base_max_interval_days: config.max_interval_days,
                ..Default::default()
            },
            BacklogThresholds::default(),
        )?;
        let orchestrator =
            SessionOrchestrator::new(store, Scheduler::default(), modes, config.session)?;

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// All routes, without the HTTP middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/backlog", get(routes::backlog::compute))
        .route(
            "/api/users/{user_id}/sessions",
            post(routes::study::start_session),
        )
        .route(
            "/api/users/{user_id}/reviews",
            post(routes::study::submit_review),
        )
        .route("/api/users/{user_id}/backlog", get(routes::backlog::for_user))
        .route(
            "/api/users/{user_id}/recovery-plan",
            get(routes::backlog::recovery_plan),
        )
        .route("/api/users/{user_id}/policy", get(routes::mode::policy))
        .route(
            "/api/users/{user_id}/mode/recovery",
            post(routes::mode::activate_recovery),
        )
        .route(
            "/api/users/{user_id}/mode/cramming",
            post(routes::mode::activate_cramming),
        )
        .route(
            "/api/users/{user_id}/mode",
            delete(routes::mode::deactivate),
        )
        .route(
            "/api/users/{user_id}/preferences",
            put(routes::mode::update_preferences),
        )
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn ReviewStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = PgReviewStore::connect(url).await?;

            tracing::info!("Running migrations...");
            db.run_migrations().await?;
            Arc::new(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, scheduling state is kept in memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let state = AppState::new(store, &config)?;
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

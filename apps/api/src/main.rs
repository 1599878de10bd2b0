mod auth;
mod config;
mod db;
mod errors;
mod generation;
mod history;
mod lifecycle;
mod llm_client;
mod models;
mod routes;
mod secrets;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::history::{ArticleStore, InMemoryArticleStore, PgArticleStore};
use crate::lifecycle::{spawn_initialization, ServiceHandle};
use crate::auth::verifier_for;
use crate::routes::{build_router, cors_layer, rate_limit::RateLimiter};
use crate::secrets::provider_for;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Article Forge API v{}", env!("CARGO_PKG_VERSION"));

    // Article history: PostgreSQL when configured, in-memory otherwise
    let history: Arc<dyn ArticleStore> = match &config.database_url {
        Some(url) => {
            let store = PgArticleStore::new(create_pool(url).await?);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set; article history is kept in memory");
            Arc::new(InMemoryArticleStore::default())
        }
    };

    // Secret fetch and client construction run in the background; requests get 503 until ready
    let service = ServiceHandle::new();
    spawn_initialization(service.clone(), config.clone(), provider_for(&config));

    let state = AppState {
        service,
        history,
        identity: verifier_for(&config),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the rate limiter when no trusted proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

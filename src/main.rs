//! Linkgraph Backend
//!
//! A REST backend for sharing webapp bookmarks, with SQLite persistence and a tag-similarity
//! graph between each user's bookmarks.

mod api;
mod app;
mod auth;
mod concepts;
mod config;
mod db;
mod dispatch;
mod errors;
mod session_store;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app::App;
use config::Config;
use session_store::SessionStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
    pub sessions: Arc<SessionStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Linkgraph Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Tag delete policy: {:?}", config.tag_delete_policy);

    // Initialize database and bind every collection
    let pool = db::init_database(&config.db_path).await?;
    let app = Arc::new(App::new(pool, &config).await?);

    // Create application state
    let state = AppState {
        app,
        sessions: Arc::new(SessionStore::new(config.session_cookie.clone())),
    };

    // Build router
    let router = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, router).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = api::routes();
    tracing::debug!("Registering {} API routes", routes.len());

    // Health check (outside the dispatcher, no session)
    let health_routes = Router::new().route("/health", get(health_check));

    dispatch::build_router(&routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;

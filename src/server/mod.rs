//! HTTP API
//!
//! - `POST /api/chat` - Ask a question
//! - `GET /api/chat` - List exchanges (paginated, filterable)
//! - `GET|PUT|DELETE /api/chat/{id}` - Read, annotate or remove one exchange
//! - `GET /api/search` - Full-text search
//! - `GET /api/analytics` - Aggregate statistics
//! - `GET /api/export` - Dump everything as JSON or CSV
//! - `GET /api/health` - Liveness and database status
//!
//! Anything outside `/api` is served from the static directory.

pub mod error;
pub mod handlers;

use crate::config::Settings;
use crate::service::{ChatError, ChatService};
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use error::ApiError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub settings: Arc<Settings>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<ChatService>, settings: Settings) -> Self {
        Self {
            service,
            settings: Arc::new(settings),
            started_at: Instant::now(),
        }
    }

    /// Map a service error, hiding internal details in production
    pub fn api_error(&self, err: ChatError) -> ApiError {
        ApiError::from_chat(err, !self.settings.is_production())
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/chat",
            post(handlers::create_chat).get(handlers::list_chats),
        )
        .route(
            "/chat/{id}",
            get(handlers::get_chat)
                .put(handlers::update_chat)
                .delete(handlers::delete_chat),
        )
        .route("/search", get(handlers::search_chats))
        .route("/analytics", get(handlers::analytics))
        .route("/export", get(handlers::export_chats))
        .route("/health", get(handlers::health))
        .fallback(handlers::api_not_found)
}

/// Build the router with all routes and middleware configured
pub fn create_router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.settings.server.static_dir);

    Router::new()
        .nest("/api", api_routes())
        .fallback_service(static_dir)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .context("Invalid server host/port")?;

    let environment = state.settings.server.environment.clone();
    let model = state.service.model_name().to_string();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        "[Server] Listening on http://{} (environment: {}, model: {})",
        addr,
        environment,
        model
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("[Server] Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[Server] Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[Server] Shutdown signal received");
}

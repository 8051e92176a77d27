//! ChatMosaic - question/answer service backed by a generative-language API
//!
//! Questions are validated, answered by the model, rendered from markdown to
//! sanitized HTML and stored so they can be listed, annotated, searched and
//! exported through the HTTP API.

mod config;
pub mod core;
pub mod service;
pub mod storage;
pub mod server;
pub mod utils;

pub mod cli;

pub use config::{DatabaseConfig, LLMConfig, LimitsConfig, LoggingConfig, ServerConfig, Settings};
pub use server::{create_router, AppState};
pub use service::ChatService;

use crate::core::llm::GeminiClient;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber; `RUST_LOG` wins over the configured level
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "chatmosaic={level},tower_http={level}",
            level = settings.logging.level
        ))
    });

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Connect the store and the model and assemble the shared application state
pub async fn init(settings: Settings) -> anyhow::Result<AppState> {
    let api_key = Settings::api_key()?;
    let store = storage::open_store(&settings.database).await?;
    let model = Arc::new(GeminiClient::new(api_key, settings.llm.clone())?);

    let service = ChatService::new(model, store, settings.limits.clone());
    tracing::info!("ChatMosaic initialized (model: {})", service.model_name());

    Ok(AppState::new(Arc::new(service), settings))
}

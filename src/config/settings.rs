use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub database: DatabaseConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `development` or `production`; production hides internal error details
    pub environment: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `memory` for the in-memory store, otherwise a SQLite path
    pub url: String,
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_question_length: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_history_turns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Self::defaults(Config::builder())?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .set_override_option("server.port", env::var("PORT").ok())?
            .set_override_option("server.environment", env::var("APP_ENV").ok())?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("llm.model", env::var("GEMINI_MODEL").ok())?
            .build()?;

        config.try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.environment", "development")?
            .set_default("server.static_dir", "public")?
            .set_default("llm.model", "gemini-1.5-flash")?
            .set_default("llm.base_url", "https://generativelanguage.googleapis.com")?
            .set_default("llm.max_tokens", 2048)?
            .set_default("llm.temperature", 0.7)?
            .set_default("llm.timeout_secs", 60)?
            .set_default("database.url", "chatmosaic.db")?
            .set_default("database.connect_retries", 5)?
            .set_default("database.retry_delay_ms", 5000)?
            .set_default("limits.max_question_length", 2000)?
            .set_default("limits.default_page_size", 20)?
            .set_default("limits.max_page_size", 100)?
            .set_default("limits.max_history_turns", 10)?
            .set_default("logging.level", "info")
    }

    pub fn api_key() -> Result<String> {
        env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }
}

/// Same values as the built-in configuration defaults
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                environment: "development".to_string(),
                static_dir: "public".to_string(),
            },
            llm: LLMConfig {
                model: "gemini-1.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                max_tokens: 2048,
                temperature: 0.7,
                timeout_secs: 60,
            },
            database: DatabaseConfig {
                url: "chatmosaic.db".to_string(),
                connect_retries: 5,
                retry_delay_ms: 5000,
            },
            limits: LimitsConfig {
                max_question_length: 2000,
                default_page_size: 20,
                max_page_size: 100,
                max_history_turns: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

mod settings;

pub use settings::{
    DatabaseConfig, LLMConfig, LimitsConfig, LoggingConfig, ServerConfig, Settings,
};

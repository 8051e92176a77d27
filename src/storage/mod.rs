//! Exchange Storage Abstraction
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Allows swapping between memory and SQLite without API changes
//! - Each storage implementation owns its indexing and aggregation strategy

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod exchange;
pub mod memory;
pub mod sqlite;

pub use exchange::{
    Analytics, Exchange, ExchangeMetadata, ExchangePatch, IdGenerator, ListQuery, Page,
    SortField, SortOrder, TagCount,
};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::config::DatabaseConfig;

/// Trait defining the exchange document store
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Persist a new exchange; fails if the id is already taken
    async fn insert(&self, exchange: &Exchange) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Exchange>>;

    /// One page of exchanges matching the query, plus the total match count
    async fn list(&self, query: &ListQuery) -> Result<Page>;

    /// Apply a whitelisted patch; `None` when no exchange has this id
    async fn update(&self, id: &str, patch: &ExchangePatch) -> Result<Option<Exchange>>;

    /// Returns false when no exchange has this id
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Full-text search over question and answer, best matches first
    async fn search(&self, text: &str, limit: u32) -> Result<Vec<Exchange>>;

    async fn analytics(&self) -> Result<Analytics>;

    /// Every exchange, oldest first
    async fn export_all(&self) -> Result<Vec<Exchange>>;

    /// Check the store is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the store selected by `database.url`
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn ExchangeStore>> {
    if config.url.eq_ignore_ascii_case("memory") {
        tracing::info!("[Storage] Using in-memory exchange store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let store = SqliteStore::connect(config).await?;
    Ok(Arc::new(store))
}

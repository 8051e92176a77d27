//! In-Memory Exchange Storage
//!
//! Information Hiding:
//! - HashMap storage structure hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Suitable for testing and ephemeral runs

use super::exchange::{
    Analytics, Exchange, ExchangePatch, ListQuery, Page, SortField, SortOrder, TagCount, TOP_TAGS,
};
use super::ExchangeStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage using HashMap
/// Data is lost when process terminates
pub struct InMemoryStore {
    exchanges: Arc<RwLock<HashMap<String, Exchange>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            exchanges: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Exchange, b: &Exchange, sort: SortField) -> Ordering {
    let primary = match sort {
        SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
        SortField::Rating => a.rating.cmp(&b.rating),
        SortField::QuestionLength => a.question.chars().count().cmp(&b.question.chars().count()),
    };
    primary
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[async_trait]
impl ExchangeStore for InMemoryStore {
    async fn insert(&self, exchange: &Exchange) -> Result<()> {
        let mut exchanges = self.exchanges.write().await;
        if exchanges.contains_key(&exchange.id) {
            bail!("exchange '{}' already exists", exchange.id);
        }
        exchanges.insert(exchange.id.clone(), exchange.clone());
        tracing::debug!("[InMemoryStore] Inserted exchange '{}'", exchange.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Exchange>> {
        let exchanges = self.exchanges.read().await;
        Ok(exchanges.get(id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        let exchanges = self.exchanges.read().await;
        let mut matching: Vec<&Exchange> = exchanges.values().filter(|e| query.matches(e)).collect();

        matching.sort_by(|a, b| {
            let ord = compare(a, b, query.sort);
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(Page { items, total })
    }

    async fn update(&self, id: &str, patch: &ExchangePatch) -> Result<Option<Exchange>> {
        let mut exchanges = self.exchanges.write().await;
        let Some(exchange) = exchanges.get_mut(id) else {
            return Ok(None);
        };
        patch.apply(exchange, Utc::now());
        tracing::debug!("[InMemoryStore] Updated exchange '{}'", id);
        Ok(Some(exchange.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut exchanges = self.exchanges.write().await;
        let removed = exchanges.remove(id).is_some();
        tracing::debug!("[InMemoryStore] Delete '{}' removed={}", id, removed);
        Ok(removed)
    }

    async fn search(&self, text: &str, limit: u32) -> Result<Vec<Exchange>> {
        let terms: Vec<String> = text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let exchanges = self.exchanges.read().await;
        let mut scored: Vec<(usize, &Exchange)> = exchanges
            .values()
            .filter_map(|e| {
                let haystack = format!("{} {}", e.question, e.answer).to_lowercase();
                let hits: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                (hits > 0).then_some((hits, e))
            })
            .collect();

        scored.sort_by(|(ha, a), (hb, b)| hb.cmp(ha).then_with(|| b.timestamp.cmp(&a.timestamp)));

        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn analytics(&self) -> Result<Analytics> {
        let exchanges = self.exchanges.read().await;
        let since = Utc::now() - Duration::hours(24);

        let mut tag_counts: HashMap<&str, u64> = HashMap::new();
        for tag in exchanges.values().flat_map(|e| e.tags.iter()) {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
        }
        let mut top_tags: Vec<TagCount> = tag_counts
            .into_iter()
            .map(|(tag, count)| TagCount {
                tag: tag.to_string(),
                count,
            })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        top_tags.truncate(TOP_TAGS);

        Ok(Analytics {
            total_chats: exchanges.len() as u64,
            starred_chats: exchanges.values().filter(|e| e.is_starred).count() as u64,
            rated_chats: exchanges.values().filter(|e| e.rating.is_some()).count() as u64,
            average_rating: average(exchanges.values().filter_map(|e| e.rating.map(f64::from))),
            average_response_time_ms: average(
                exchanges.values().map(|e| e.metadata.response_time_ms as f64),
            ),
            average_question_length: average(
                exchanges.values().map(|e| e.metadata.question_length as f64),
            ),
            average_answer_length: average(
                exchanges.values().map(|e| e.metadata.answer_length as f64),
            ),
            chats_last_24h: exchanges.values().filter(|e| e.timestamp >= since).count() as u64,
            top_tags,
        })
    }

    async fn export_all(&self) -> Result<Vec<Exchange>> {
        let exchanges = self.exchanges.read().await;
        let mut all: Vec<Exchange> = exchanges.values().cloned().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::exchange::tests::sample;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let mut exchange = sample(&format!("{}", 100 + i));
            exchange.timestamp = Utc::now() - Duration::minutes(10 - i);
            exchange.is_starred = i % 2 == 0;
            exchange.rating = if i > 1 { Some(i as u8) } else { None };
            exchange.tags = vec!["rust".to_string()];
            store.insert(&exchange).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryStore::new();
        store.insert(&sample("1")).await.unwrap();

        let loaded = store.get("1").await.unwrap().unwrap();
        assert_eq!(loaded.question, "What is Rust?");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryStore::new();
        store.insert(&sample("1")).await.unwrap();
        assert!(store.insert(&sample("1")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_paginates_newest_first() {
        let store = seeded().await;
        let page = store
            .list(&ListQuery {
                page: 2,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        let ids: Vec<&str> = page.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["102", "101"]);
    }

    #[tokio::test]
    async fn test_list_filters_starred_and_rating() {
        let store = seeded().await;
        let page = store
            .list(&ListQuery {
                starred: Some(true),
                min_rating: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "104");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = seeded().await;
        let patch = ExchangePatch {
            rating: Some(Some(5)),
            ..Default::default()
        };
        let updated = store.update("100", &patch).await.unwrap().unwrap();
        assert_eq!(updated.rating, Some(5));
        assert!(store.update("nope", &patch).await.unwrap().is_none());

        assert!(store.delete("100").await.unwrap());
        assert!(!store.delete("100").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_and_analytics() {
        let store = seeded().await;
        let mut other = sample("999");
        other.question = "How do lifetimes work?".to_string();
        other.answer = "Lifetimes track borrows.".to_string();
        store.insert(&other).await.unwrap();

        let results = store.search("lifetimes", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "999");

        let stats = store.analytics().await.unwrap();
        assert_eq!(stats.total_chats, 6);
        assert_eq!(stats.starred_chats, 3);
        assert_eq!(stats.rated_chats, 3);
        assert_eq!(stats.average_rating, Some(3.0));
        assert_eq!(stats.top_tags[0], TagCount { tag: "rust".to_string(), count: 5 });
    }
}

//! Exchange document and the query/patch types the stores understand

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};

/// One question/answer pair as stored and returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub formatted_answer: String,
    pub metadata: ExchangeMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub is_starred: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeMetadata {
    pub model: String,
    pub response_time_ms: u64,
    pub question_length: usize,
    pub answer_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Exchange {
    /// Copy without the client-identifying metadata fields
    pub fn redacted(mut self) -> Self {
        self.metadata.user_agent = None;
        self.metadata.client_ip = None;
        self
    }
}

/// Fields an update is allowed to touch. `rating: Some(None)` clears the rating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangePatch {
    pub is_starred: Option<bool>,
    pub rating: Option<Option<u8>>,
    pub tags: Option<Vec<String>>,
}

impl ExchangePatch {
    pub fn is_empty(&self) -> bool {
        self.is_starred.is_none() && self.rating.is_none() && self.tags.is_none()
    }

    pub fn apply(&self, exchange: &mut Exchange, now: DateTime<Utc>) {
        if let Some(starred) = self.is_starred {
            exchange.is_starred = starred;
        }
        if let Some(rating) = self.rating {
            exchange.rating = rating;
        }
        if let Some(tags) = &self.tags {
            exchange.tags = tags.clone();
        }
        exchange.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Timestamp,
    Rating,
    QuestionLength,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Already-validated list parameters; `page` starts at 1
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub starred: Option<bool>,
    pub min_rating: Option<u8>,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            starred: None,
            min_rating: None,
            sort: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn matches(&self, exchange: &Exchange) -> bool {
        if let Some(starred) = self.starred {
            if exchange.is_starred != starred {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if exchange.rating.map_or(true, |r| r < min) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Exchange>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_chats: u64,
    pub starred_chats: u64,
    pub rated_chats: u64,
    pub average_rating: Option<f64>,
    pub average_response_time_ms: Option<f64>,
    pub average_question_length: Option<f64>,
    pub average_answer_length: Option<f64>,
    pub chats_last_24h: u64,
    pub top_tags: Vec<TagCount>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

pub const TOP_TAGS: usize = 10;

/// Timestamp-based ids: Unix milliseconds, bumped past the last id handed out
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => last = actual,
            }
        }
    }
}

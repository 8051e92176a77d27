//! Chat service
//!
//! Composes the content filter, the language model, the markdown formatter
//! and the exchange store. Both the HTTP layer and the CLI go through here.

pub mod export;

use crate::config::LimitsConfig;
use crate::core::filter::{self, FilterError};
use crate::core::llm::{ChatTurn, LanguageModel, ProviderError};
use crate::core::markdown;
use crate::storage::{
    Analytics, Exchange, ExchangeMetadata, ExchangePatch, ExchangeStore, IdGenerator, ListQuery,
    Page, SortField, SortOrder,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub use export::ExportFormat;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("Chat not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<FilterError> for ChatError {
    fn from(err: FilterError) -> Self {
        ChatError::Validation(err.to_string())
    }
}

/// Who asked, recorded in the exchange metadata
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Raw list parameters as they arrive in the query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub starred: Option<String>,
    pub min_rating: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(query: &ListQuery, total: u64) -> Self {
        let limit = u64::from(query.limit.max(1));
        let total_pages = total.div_ceil(limit);
        Self {
            page: query.page,
            limit: query.limit,
            total,
            total_pages,
            has_next: u64::from(query.page) < total_pages,
            has_prev: query.page > 1,
        }
    }
}

pub struct ChatService {
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn ExchangeStore>,
    limits: LimitsConfig,
    ids: IdGenerator,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn ExchangeStore>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            model,
            store,
            limits,
            ids: IdGenerator::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn store(&self) -> &Arc<dyn ExchangeStore> {
        &self.store
    }

    /// Validate the question, ask the model, format and persist the answer.
    pub async fn ask(&self, request: AskRequest, client: ClientInfo) -> Result<Exchange, ChatError> {
        let question = filter::normalize_question(&request.question, self.limits.max_question_length)?;

        let skip = request
            .history
            .len()
            .saturating_sub(self.limits.max_history_turns);
        let history = &request.history[skip..];

        let started = Instant::now();
        let generation = self.model.generate(&question, history).await.map_err(|e| {
            tracing::error!("[ChatService] Model call failed: {}", e);
            e
        })?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let answer = generation.text.trim().to_string();
        if answer.is_empty() {
            tracing::error!("[ChatService] Model {} returned a blank answer", generation.model);
            return Err(ProviderError::Other("model returned an empty answer".to_string()).into());
        }

        let now = Utc::now();
        let exchange = Exchange {
            id: self.ids.next_id(now),
            formatted_answer: markdown::render(&answer),
            metadata: ExchangeMetadata {
                model: generation.model,
                response_time_ms,
                question_length: question.chars().count(),
                answer_length: answer.chars().count(),
                user_agent: client.user_agent,
                client_ip: client.client_ip,
                extra: Map::new(),
            },
            question,
            answer,
            tags: Vec::new(),
            rating: None,
            is_starred: false,
            timestamp: now,
            updated_at: None,
        };

        self.store.insert(&exchange).await.map_err(|e| {
            tracing::error!("[ChatService] Failed to persist exchange: {:#}", e);
            e
        })?;

        tracing::info!(
            "[ChatService] Answered exchange {} in {}ms ({} chars)",
            exchange.id,
            response_time_ms,
            exchange.metadata.answer_length
        );
        Ok(exchange)
    }

    /// Turn raw query parameters into a capped, validated list query.
    pub fn list_query(&self, params: &ListParams) -> Result<ListQuery, ChatError> {
        let page = params
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);

        let limit = params
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(self.limits.default_page_size)
            .min(self.limits.max_page_size);

        let starred = match params.starred.as_deref().map(str::trim) {
            Some("true") | Some("1") => Some(true),
            Some("false") | Some("0") => Some(false),
            _ => None,
        };

        let min_rating = params
            .min_rating
            .as_deref()
            .map(parse_rating_param)
            .transpose()?;

        let sort = match params.sort_by.as_deref() {
            Some("rating") => SortField::Rating,
            Some("questionLength") => SortField::QuestionLength,
            _ => SortField::Timestamp,
        };

        let order = match params.order.as_deref() {
            Some(o) if o.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };

        Ok(ListQuery {
            page,
            limit,
            starred,
            min_rating,
            sort,
            order,
        })
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page, ChatError> {
        Ok(self.store.list(query).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Exchange, ChatError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(id.to_string()))
    }

    pub async fn update(&self, id: &str, body: &Value) -> Result<Exchange, ChatError> {
        let patch = parse_patch(body)?;
        let updated = self
            .store
            .update(id, &patch)
            .await?
            .ok_or_else(|| ChatError::NotFound(id.to_string()))?;
        tracing::info!("[ChatService] Updated exchange {}", id);
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ChatError> {
        if !self.store.delete(id).await? {
            return Err(ChatError::NotFound(id.to_string()));
        }
        tracing::info!("[ChatService] Deleted exchange {}", id);
        Ok(())
    }

    pub async fn search(&self, text: &str, limit: Option<u32>) -> Result<Vec<Exchange>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("Search query is required".to_string()));
        }
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(self.limits.default_page_size)
            .min(self.limits.max_page_size);
        Ok(self.store.search(text, limit).await?)
    }

    pub async fn analytics(&self) -> Result<Analytics, ChatError> {
        Ok(self.store.analytics().await?)
    }

    pub async fn export(&self, format: ExportFormat) -> Result<String, ChatError> {
        let all = self.store.export_all().await?;
        tracing::info!("[ChatService] Exporting {} exchanges as {:?}", all.len(), format);
        Ok(export::render(&all, format)?)
    }
}

fn parse_rating_param(raw: &str) -> Result<u8, ChatError> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ChatError::Validation("minRating must be between 1 and 5".to_string()))
}

/// Pick the whitelisted fields out of an update body; everything else is ignored.
pub fn parse_patch(body: &Value) -> Result<ExchangePatch, ChatError> {
    let fields = body
        .as_object()
        .ok_or_else(|| ChatError::Validation("Request body must be a JSON object".to_string()))?;

    let mut patch = ExchangePatch::default();

    if let Some(value) = fields.get("isStarred") {
        let starred = value
            .as_bool()
            .ok_or_else(|| ChatError::Validation("isStarred must be a boolean".to_string()))?;
        patch.is_starred = Some(starred);
    }

    if let Some(value) = fields.get("rating") {
        patch.rating = Some(match value {
            Value::Null => None,
            other => Some(
                other
                    .as_u64()
                    .filter(|r| (1..=5).contains(r))
                    .map(|r| r as u8)
                    .ok_or_else(|| {
                        ChatError::Validation("rating must be an integer between 1 and 5".to_string())
                    })?,
            ),
        });
    }

    if let Some(value) = fields.get("tags") {
        let tags = value
            .as_array()
            .and_then(|items| items.iter().map(Value::as_str).collect::<Option<Vec<_>>>())
            .ok_or_else(|| ChatError::Validation("tags must be an array of strings".to_string()))?;
        patch.tags = Some(filter::normalize_tags(tags));
    }

    if patch.is_empty() {
        return Err(ChatError::Validation(
            "Nothing to update: provide isStarred, rating or tags".to_string(),
        ));
    }

    Ok(patch)
}

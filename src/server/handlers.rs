use super::error::ApiError;
use super::AppState;
use crate::service::{AskRequest, ClientInfo, ExportFormat, ListParams, Pagination};
use crate::storage::Exchange;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedChat {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub formatted_answer: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub metadata: CreatedMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMetadata {
    pub model: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatList {
    pub chats: Vec<Exchange>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let client_ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header_str("x-real-ip"));

    ClientInfo {
        user_agent: header_str(header::USER_AGENT.as_str()),
        client_ip,
    }
}

/// POST /api/chat
pub async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedChat>), ApiError> {
    let Json(request) = body?;
    let exchange = state
        .service
        .ask(request, client_info(&headers))
        .await
        .map_err(|e| state.api_error(e))?;

    let created = CreatedChat {
        id: exchange.id,
        question: exchange.question,
        answer: exchange.answer,
        formatted_answer: exchange.formatted_answer,
        timestamp: exchange.timestamp,
        metadata: CreatedMetadata {
            model: exchange.metadata.model,
            response_time_ms: exchange.metadata.response_time_ms,
        },
    };
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/chat
pub async fn list_chats(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ChatList>, ApiError> {
    let Query(params) = params?;
    let query = state
        .service
        .list_query(&params)
        .map_err(|e| state.api_error(e))?;
    let page = state
        .service
        .list(&query)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(ChatList {
        pagination: Pagination::new(&query, page.total),
        chats: page.items.into_iter().map(Exchange::redacted).collect(),
    }))
}

/// GET /api/chat/{id}
pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Exchange>, ApiError> {
    let exchange = state
        .service
        .get(&id)
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(Json(exchange.redacted()))
}

/// PUT /api/chat/{id}
pub async fn update_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Exchange>, ApiError> {
    let Json(body) = body?;
    let exchange = state
        .service
        .update(&id, &body)
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(Json(exchange.redacted()))
}

/// DELETE /api/chat/{id}
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .service
        .delete(&id)
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(Json(json!({ "success": true, "id": id })))
}

/// GET /api/search
pub async fn search_chats(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let text = params.q.unwrap_or_default();
    let limit = params.limit.and_then(|l| l.trim().parse::<u32>().ok());

    let results: Vec<Exchange> = state
        .service
        .search(&text, limit)
        .await
        .map_err(|e| state.api_error(e))?
        .into_iter()
        .map(Exchange::redacted)
        .collect();

    Ok(Json(json!({
        "query": text.trim(),
        "count": results.len(),
        "results": results,
    })))
}

/// GET /api/analytics
pub async fn analytics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state
        .service
        .analytics()
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(Json(json!({
        "analytics": stats,
        "generatedAt": Utc::now(),
    })))
}

/// GET /api/export
pub async fn export_chats(
    State(state): State<AppState>,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let format = match params.format.as_deref() {
        None => ExportFormat::default(),
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|e| ApiError::Validation(e.to_string()))?,
    };

    let body = state
        .service
        .export(format)
        .await
        .map_err(|e| state.api_error(e))?;

    let filename = format!(
        "chatmosaic-export-{}.{}",
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.service.store().ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("[HTTP] Health check database ping failed: {:#}", e);
            "disconnected"
        }
    };
    let healthy = database == "connected";

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "database": database,
            "model": state.service.model_name(),
            "environment": state.settings.server.environment,
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": state.started_at.elapsed().as_secs(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Unknown routes under /api
pub async fn api_not_found() -> ApiError {
    ApiError::NotFound("API endpoint not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_info_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        let info = client_info(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(info.client_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_info_empty_headers() {
        let info = client_info(&HeaderMap::new());
        assert!(info.user_agent.is_none());
        assert!(info.client_ip.is_none());
    }
}

//! HTTP error envelope
//!
//! Every failed request answers with `{ "error": ..., "code": ... }` and the
//! status code of its category.

use crate::core::llm::ProviderError;
use crate::service::ChatError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    /// Map a service error; `expose_details` adds the underlying cause to 500s.
    pub fn from_chat(err: ChatError, expose_details: bool) -> Self {
        match err {
            ChatError::Validation(message) => ApiError::Validation(message),
            ChatError::NotFound(_) => ApiError::NotFound("Chat not found".to_string()),
            ChatError::Provider(ProviderError::InvalidRequest(detail)) => ApiError::Validation(
                format!("The AI service rejected this question: {}", detail),
            ),
            ChatError::Provider(ProviderError::QuotaExceeded(_)) => ApiError::QuotaExceeded(
                "AI service quota exceeded, please try again later".to_string(),
            ),
            ChatError::Provider(ProviderError::Unavailable(_)) => ApiError::Unavailable(
                "AI service is temporarily unavailable, please try again later".to_string(),
            ),
            ChatError::Provider(ProviderError::Other(detail)) => ApiError::Internal {
                message: "Failed to get a response from the AI service".to_string(),
                details: expose_details.then_some(detail),
            },
            ChatError::Storage(e) => ApiError::Internal {
                message: "Database operation failed".to_string(),
                details: expose_details.then(|| format!("{:#}", e)),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[HTTP] {} {}", status, self);
        } else {
            tracing::debug!("[HTTP] {} {}", status, self);
        }

        let message = self.to_string();
        let details = match &self {
            ApiError::Internal { details, .. } => details.as_deref(),
            _ => None,
        };
        let body = ErrorBody {
            error: &message,
            code: self.code(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_to_status_codes() {
        let cases = [
            (ProviderError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (ProviderError::QuotaExceeded("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (ProviderError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ProviderError::Other("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (provider, status) in cases {
            let err = ApiError::from_chat(ChatError::Provider(provider), false);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn test_details_hidden_unless_exposed() {
        let hidden = ApiError::from_chat(ChatError::Storage(anyhow::anyhow!("disk full")), false);
        assert!(matches!(hidden, ApiError::Internal { details: None, .. }));

        let shown = ApiError::from_chat(ChatError::Storage(anyhow::anyhow!("disk full")), true);
        match shown {
            ApiError::Internal { details, .. } => assert_eq!(details.as_deref(), Some("disk full")),
            other => panic!("unexpected {:?}", other),
        }
    }
}

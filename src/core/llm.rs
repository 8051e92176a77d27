use crate::config::LLMConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A single prior turn handed to the model as context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Text produced by the provider and the model that produced it
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
}

/// Provider failures, already sorted into the categories callers map to HTTP
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request rejected by provider: {0}")]
    InvalidRequest(String),

    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Sort a provider failure by its HTTP status and the text of its message.
    pub fn categorize(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if status == Some(StatusCode::TOO_MANY_REQUESTS)
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
        {
            Self::QuotaExceeded(message)
        } else if status == Some(StatusCode::SERVICE_UNAVAILABLE)
            || lower.contains("unavailable")
            || lower.contains("overloaded")
        {
            Self::Unavailable(message)
        } else if lower.contains("invalid_argument")
            || lower.contains("safety")
            || lower.contains("blocked")
        {
            Self::InvalidRequest(message)
        } else {
            Self::Other(message)
        }
    }
}

/// Generative-language backend used to answer questions
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply to `prompt`, with earlier turns as context
    async fn generate(&self, prompt: &str, history: &[ChatTurn])
        -> Result<Generation, ProviderError>;

    /// Name of the model requests are sent to
    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client for the Google Generative Language (Gemini) REST API
pub struct GeminiClient {
    client: Client,
    api_key: String,
    settings: LLMConfig,
}

impl GeminiClient {
    pub fn new(api_key: String, settings: LLMConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    fn build_request(&self, prompt: &str, history: &[ChatTurn]) -> GenerateRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .filter(|turn| !turn.content.trim().is_empty())
            .map(|turn| Content {
                // Gemini only knows "user" and "model"
                role: Some(if turn.role == "user" { "user" } else { "model" }.to_string()),
                parts: vec![Part {
                    text: Some(turn.content.clone()),
                }],
            })
            .collect();

        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
        });

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<Generation, ProviderError> {
        let request = self.build_request(prompt, history);

        tracing::debug!(
            "[GeminiClient] Sending prompt ({} chars, {} history turns) to {}",
            prompt.len(),
            history.len(),
            self.settings.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("[GeminiClient] HTTP request failed: {}", e);
                ProviderError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = match serde_json::from_str::<ErrorEnvelope>(&error_text) {
                Ok(envelope) => format!("{} {}", envelope.error.status, envelope.error.message),
                Err(_) => error_text,
            };
            tracing::warn!(
                "[GeminiClient] API returned error status {}: {}",
                status,
                message
            );
            return Err(ProviderError::categorize(Some(status), message.trim()));
        }

        let body = response.json::<GenerateResponse>().await.map_err(|e| {
            tracing::warn!("[GeminiClient] Failed to decode response body: {}", e);
            ProviderError::Other(format!("Response decode error: {}", e))
        })?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidRequest(format!(
                "prompt blocked: {}",
                reason
            )));
        }

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("response contained no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(ProviderError::categorize(
                None,
                format!("empty answer (finish reason {})", reason),
            ));
        }

        Ok(Generation {
            text,
            model: self.settings.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let settings = LLMConfig {
            model: "gemini-test".to_string(),
            base_url: server.uri(),
            max_tokens: 256,
            temperature: 0.2,
            timeout_secs: 5,
        };
        GeminiClient::new("test-key".to_string(), settings).unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{"text": "Rust is "}, {"text": "a language."}]
                    },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let generation = client
            .generate("What is Rust?", &[ChatTurn::user("hi"), ChatTurn::assistant("hello")])
            .await
            .unwrap();

        assert_eq!(generation.text, "Rust is a language.");
        assert_eq!(generation.model, "gemini-test");
    }

    #[tokio::test]
    async fn test_quota_error_is_categorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .generate("question", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_invalid_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [],
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .generate("question", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_categorize_by_message() {
        assert!(matches!(
            ProviderError::categorize(None, "The model is overloaded"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::categorize(Some(StatusCode::BAD_REQUEST), "INVALID_ARGUMENT bad field"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::categorize(Some(StatusCode::INTERNAL_SERVER_ERROR), "INTERNAL"),
            ProviderError::Other(_)
        ));
    }
}

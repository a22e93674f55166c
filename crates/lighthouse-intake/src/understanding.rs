//! Remote language-understanding client.
//!
//! Extraction and interstate research are both expressed as a single
//! chat-completion request against an OpenAI-compatible endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use lighthouse_core::config::UnderstandingConfig;

use crate::error::IntakeError;

/// One request to the understanding service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the service for a bare JSON object.
    pub json_output: bool,
}

/// Black-box language understanding.
#[async_trait]
pub trait UnderstandingService: Send + Sync {
    /// Return the raw text content of the model's reply.
    async fn complete(&self, request: CompletionRequest) -> Result<String, IntakeError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct HttpUnderstandingService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpUnderstandingService {
    pub fn new(config: &UnderstandingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_body(&self, request: CompletionRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

impl std::fmt::Debug for HttpUnderstandingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUnderstandingService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl UnderstandingService for HttpUnderstandingService {
    async fn complete(&self, request: CompletionRequest) -> Result<String, IntakeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder
            .send()
            .await
            .map_err(|e| IntakeError::Understanding(format!("request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(IntakeError::Understanding(format!(
                "status {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| IntakeError::Understanding(format!("response parse failed: {}", e)))?;

        extract_content(parsed)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, IntakeError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| IntakeError::Understanding("empty completion".to_string()))
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```\s*$")
            .expect("code fence pattern is valid")
    });
    match fence.captures(raw).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

//! Completion client for OpenAI-compatible chat APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

/// An image attached to a completion request.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Base64-encoded image bytes.
    pub base64: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

impl ImageData {
    pub fn png(base64: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            mime_type: "image/png".to_string(),
        }
    }

    /// `data:` URL embedding the image.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// One system + user exchange sent to a completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model name. Empty means the client's configured default.
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    pub image: Option<ImageData>,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_text: user_text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }
}

/// A text completion backend (LLM or VLM).
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw text content of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

/// Configuration for the AI model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub extra_body: HashMap<String, Value>,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "gpt-4o".to_string(),
            max_tokens: 3000,
            temperature: 0.0,
            top_p: 0.85,
            extra_body: HashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl ModelConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(flatten)]
    extra: &'a HashMap<String, Value>,
}

/// One chat message in the request body.
#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct ModelClient {
    config: ModelConfig,
    http: Client,
    endpoint: String,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Self {
            config,
            http: Client::new(),
            endpoint,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let model = match request.model.as_str() {
            "" => self.config.model_name.as_str(),
            name => name,
        };
        ChatRequest {
            model,
            messages: [
                MessageBuilder::create_system_message(&request.system_prompt),
                MessageBuilder::create_user_message(&request.user_text, request.image.as_ref()),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            extra: &self.config.extra_body,
        }
    }

    /// Transport failures, rate limiting and server errors are worth another attempt.
    fn is_retryable(error: &ModelError) -> bool {
        match error {
            ModelError::RequestFailed(e) => !e.is_decode(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<String, ModelError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let reply: ChatResponse = response.json().await?;
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ParseError("No choices in response".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl CompletionService for ModelClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let body = self.body(&request);
        let attempts = self.config.max_retries + 1;
        let delay = Duration::from_secs(self.config.retry_delay_secs);

        let mut attempt = 1;
        loop {
            let error = match self.post(&body).await {
                Ok(content) => return Ok(content),
                Err(e) if !Self::is_retryable(&e) => return Err(e),
                Err(e) => e,
            };
            if attempt >= attempts {
                return Err(ModelError::MaxRetriesExceeded(attempts, error.to_string()));
            }
            warn!(attempt, attempts, error = %error, delay_secs = delay.as_secs(), "Completion request failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Builders for the two chat messages of a request.
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn create_system_message(content: &str) -> ChatMessage<'_> {
        ChatMessage {
            role: "system",
            content: MessageContent::Text(content),
        }
    }

    /// User message with the image, if any, placed before the text.
    pub fn create_user_message<'a>(text: &'a str, image: Option<&ImageData>) -> ChatMessage<'a> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = image {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }
        parts.push(ContentPart::Text { text });
        ChatMessage {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

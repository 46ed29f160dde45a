//! Chat-completion contract
//!
//! Request and response bodies of the hosted chat-completion endpoint,
//! the [`ChatModel`] seam, and [`OpenAiChat`] which speaks it over HTTPS.

use async_trait::async_trait;
use callscope_core::LlmConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// LLM failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// API key environment variable is unset
    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    /// Client could not be configured
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// Transport failure
    #[error("http error: {0}")]
    Http(String),

    /// Endpoint answered with a non-success status
    #[error("chat endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response contained no message
    #[error("empty chat completion")]
    EmptyResponse,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Request with model settings from configuration
    #[must_use]
    pub fn from_config(config: &LlmConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Text of the first choice
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Chat-completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// OpenAI-compatible chat-completion client
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    chat_url: Url,
}

impl OpenAiChat {
    /// Build a client with an explicit key
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let mut base_url =
            Url::parse(&config.base_url).map_err(|err| LlmError::Config(format!("base url: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path().trim_end_matches('/'));
            base_url.set_path(&path);
        }
        let chat_url = base_url
            .join(CHAT_COMPLETIONS_PATH)
            .map_err(|err| LlmError::Config(format!("chat url: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|err| LlmError::Config(format!("api key header: {err}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| LlmError::Config(format!("client build: {err}")))?;

        Ok(Self { client, chat_url })
    }

    /// Build a client reading the key from `config.api_key_env`
    pub fn from_env(config: &LlmConfig) -> Result<Self, LlmError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, &key)
    }

    #[must_use]
    pub fn chat_url(&self) -> &Url {
        &self.chat_url
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat completion request");
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat completion rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))
    }
}

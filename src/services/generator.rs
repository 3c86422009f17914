//! Groq chat-completions client for email content generation
//!
//! Fills the campaign's prompt template with a recipient's substitution
//! data, wraps it in the fixed generation instruction, and asks the model
//! for the message body.

use crate::config::GenerationConfig;
use crate::models::SubstitutionData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

const USER_AGENT: &str = "mailforge/0.1.0";
const PROMPT_PREFIX: &str = "Generate a professional email with the following context: ";

/// Content generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limited by generation API")]
    RateLimited,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Empty response from generation API")]
    EmptyResponse,
}

/// Generates an email body from a prompt template and per-recipient data
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        data: &SubstitutionData,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Render a substitution value the way it should appear in a prompt
///
/// Strings are inserted bare; other JSON types use their JSON rendering.
fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{key}` placeholders in a template with substitution values
///
/// Keys absent from the data leave their placeholders untouched; data keys
/// absent from the template are ignored. Replacement runs in sorted key
/// order, so a value that itself contains a placeholder chains
/// deterministically instead of following map iteration order.
pub fn fill_template(template: &str, data: &SubstitutionData) -> String {
    let mut entries: Vec<(&String, &serde_json::Value)> = data.iter().collect();
    entries.sort_by_key(|&(key, _)| key);

    let mut filled = template.to_string();
    for (key, value) in entries {
        let placeholder = format!("{{{}}}", key);
        filled = filled.replace(&placeholder, &value_text(value));
    }
    filled
}

/// Groq API client
pub struct GroqClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl GroqClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ContentGenerator for GroqClient {
    async fn generate(
        &self,
        prompt: &str,
        data: &SubstitutionData,
    ) -> Result<String, GenerationError> {
        let filled = fill_template(prompt, data);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{}{}", PROMPT_PREFIX, filled),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, "Requesting content generation");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            return Err(GenerationError::InvalidApiKey);
        }

        if status == 429 {
            return Err(GenerationError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiError(status.as_u16(), error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        tracing::debug!(chars = content.len(), "Content generation successful");

        Ok(content)
    }
}

//! Chat-completion generation adapter.
//!
//! Sends the rendered prompt as a single user message to an
//! OpenAI-compatible `chat/completions` endpoint and splits the reply into
//! files with [`extract_files`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GenerateError, GenerateResult};
use crate::extract::extract_files;
use crate::generator::{Generation, Generator};
use crate::prompt::Prompt;
use crate::settings::LlmSettings;

pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Generator backed by a chat-completion HTTP API.
pub struct ChatCompletionGenerator {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ChatCompletionGenerator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> GenerateResult<Self> {
        Self::build(base_url.into(), api_key.into(), model.into(), DEFAULT_TIMEOUT)
    }

    /// Create an adapter from settings; fails when no API key is set.
    pub fn from_settings(settings: &LlmSettings) -> GenerateResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GenerateError::NotConfigured("Set INFRAGEN_LLM_API_KEY".to_string()))?;

        let mut generator = Self::build(
            settings.base_url.clone(),
            api_key,
            settings.model.clone(),
            Duration::from_secs(settings.timeout_secs),
        )?;
        generator.max_tokens = settings.max_tokens;
        Ok(generator)
    }

    fn build(base_url: String, api_key: String, model: String, timeout: Duration) -> GenerateResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_key,
            model,
            temperature: 1.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, content: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Reply text of the first choice.
fn reply_content(response: ChatResponse) -> GenerateResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| GenerateError::InvalidResponse("no choices".to_string()))
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    async fn generate(&self, description: &str, prompt: &Prompt) -> GenerateResult<Generation> {
        let request = self.request_body(prompt.render(description));
        debug!(model = %self.model, prompt = prompt.id, "Sending generation request");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Generation API returned an error");
            return Err(GenerateError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;
        let files = extract_files(&reply_content(parsed)?);

        Ok(Generation {
            files,
            request_id: uuid::Uuid::new_v4().to_string(),
            model: self.model.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

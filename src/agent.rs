//! LLM agent module.
//!
//! [`ChatModel`] is the seam the summarize engine talks to; [`OpenAiChat`]
//! speaks the OpenAI chat-completions protocol over reqwest.

use crate::credential::ApiKey;
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("LLM returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("LLM returned no completion")]
    EmptyCompletion,
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::RequestFailed(e.to_string())
    }
}

/// Sampling temperature, 0.0 to 2.0 in steps of 0.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

#[derive(Error, Debug, PartialEq)]
pub enum TemperatureError {
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    OutOfRange(f32),
    #[error("temperature must be a multiple of 0.1, got {0}")]
    OffStep(f32),
    #[error("not a number: {0}")]
    NotANumber(String),
}

impl Temperature {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 2.0;
    pub const STEP: f32 = 0.1;

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Temperature(0.1)
    }
}

impl TryFrom<f32> for Temperature {
    type Error = TemperatureError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(TemperatureError::OutOfRange(value));
        }
        let steps = value / Self::STEP;
        if (steps - steps.round()).abs() > 1e-3 {
            return Err(TemperatureError::OffStep(value));
        }
        // Snap so 0.30000001 and friends serialize cleanly.
        Ok(Temperature(steps.round() * Self::STEP))
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> f32 {
        t.0
    }
}

impl FromStr for Temperature {
    type Err = TemperatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| TemperatureError::NotANumber(s.to_string()))?;
        Temperature::try_from(value)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// A chat model that answers one system/human prompt pair.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError>;

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
    temperature: Temperature,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: ApiKey,
        temperature: Temperature,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature,
        })
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.expose());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| ModelError::RequestFailed(format!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature.value(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.human,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let content = parse_completion(&text)?;
        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_completion(body: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ModelError::ParseError(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ModelError::EmptyCompletion)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

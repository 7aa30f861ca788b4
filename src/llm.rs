//! Language model clients.
//!
//! Defines the [`LlmClient`] trait and its backends:
//! - **[`GeminiClient`]** — Google `generateContent` with a rotating ring of API keys.
//! - **[`GroqClient`]** — Groq's OpenAI-compatible chat completions endpoint.
//! - **[`DisabledClient`]** — always fails; used when no provider is configured.
//!
//! Use [`create_client`] to build the backend selected in `[llm]`.
//!
//! # Key rotation
//!
//! Gemini keys are tried in ring order. A response that signals quota
//! exhaustion (HTTP 429, or a body mentioning "quota") moves the shared
//! cursor to the next key and the request is retried, at most once per key.
//! Any other failure is returned immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::prompt::Prompt;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Reply used when the model answers with no text.
pub const EMPTY_REPLY: &str = "Codex20 non ha prodotto risposta.";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model is disabled")]
    Disabled,
    #[error("no API key configured for {0}")]
    MissingApiKey(String),
    #[error("quota exhausted on all {attempts} API keys")]
    QuotaExhausted { attempts: usize },
    #[error("model API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model API request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

// Request URLs may carry credentials; never keep them in the error.
impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.without_url())
    }
}

/// Prompt in, text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend identifier, e.g. `"gemini"`.
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError>;
}

/// API keys with a shared cursor.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current key and its index.
    pub fn current(&self) -> Option<(usize, &str)> {
        if self.keys.is_empty() {
            return None;
        }
        let index = self.cursor.load(Ordering::Acquire) % self.keys.len();
        Some((index, self.keys[index].as_str()))
    }

    /// Advance past `index`, unless another request already did.
    pub fn rotate_from(&self, index: usize) {
        if self.keys.is_empty() {
            return;
        }
        let next = (index + 1) % self.keys.len();
        let _ = self
            .cursor
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire);
    }
}

fn is_quota_error(status: u16, body: &str) -> bool {
    status == 429 || body.to_lowercase().contains("quota")
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ Disabled ============

pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ Gemini ============

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    keys: KeyRing,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_keys.is_empty() {
            bail!("GEMINI_API_KEYS not set and llm.api_keys is empty");
        }
        Ok(Self {
            client: http_client(config)?,
            base_url: GEMINI_BASE_URL.to_string(),
            model: config.model_name().to_string(),
            keys: KeyRing::new(config.api_keys.clone()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt.to_single_text() }] }],
        });

        let attempts = self.keys.len();
        for _ in 0..attempts {
            let (index, key) = self
                .keys
                .current()
                .ok_or_else(|| LlmError::MissingApiKey("gemini".to_string()))?;

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let json: Value = response.json().await?;
                return parse_gemini_response(&json);
            }

            let body_text = response.text().await.unwrap_or_default();
            if is_quota_error(status.as_u16(), &body_text) {
                tracing::warn!(key_index = index, "Gemini quota exceeded, rotating key");
                self.keys.rotate_from(index);
                continue;
            }

            return Err(LlmError::Http {
                status: status.as_u16(),
                body: body_text,
            });
        }

        if attempts == 0 {
            return Err(LlmError::MissingApiKey("gemini".to_string()));
        }
        Err(LlmError::QuotaExhausted { attempts })
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(json: &Value) -> Result<String, LlmError> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidResponse("missing candidates[0].content.parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    Ok(text)
}

// ============ Groq ============

pub struct GroqClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    keys: KeyRing,
}

impl GroqClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_keys.is_empty() {
            bail!("GROQ_API_KEY not set and llm.api_keys is empty");
        }
        Ok(Self {
            client: http_client(config)?,
            base_url: GROQ_BASE_URL.to_string(),
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            keys: KeyRing::new(config.api_keys.clone()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let (_, key) = self
            .keys
            .current()
            .ok_or_else(|| LlmError::MissingApiKey("groq".to_string()))?;

        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": prompt.system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt.user }));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let json: Value = response.json().await?;
        Ok(parse_chat_completion(&json))
    }
}

/// First choice's message content, or [`EMPTY_REPLY`].
pub fn parse_chat_completion(json: &Value) -> String {
    json["choices"][0]["message"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .unwrap_or(EMPTY_REPLY)
        .to_string()
}

/// Create the [`LlmClient`] selected by `config.provider`.
///
/// | Config Value | Client |
/// |-------------|--------|
/// | `"disabled"` | [`DisabledClient`] |
/// | `"gemini"` | [`GeminiClient`] |
/// | `"groq"` | [`GroqClient`] |
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "groq" => Ok(Arc::new(GroqClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

//! crates/flashcards_core/src/ai.rs
//!
//! The chat-completion contract shared by the generation service and the HTTP
//! adapter that talks to the model provider: request/response types, parameter
//! validation, JSON-mode prompt augmentation, and the error taxonomy together
//! with its retry rules.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::TokenUsage;

/// Appended to (or injected as) the system prompt whenever a JSON response is requested.
pub const JSON_MODE_INSTRUCTION: &str = "IMPORTANT: Respond ONLY with valid JSON. Do not include markdown code blocks, explanations, or any text outside the JSON object.";

//=========================================================================================
// Messages
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

//=========================================================================================
// Parameters
//=========================================================================================

/// A named JSON schema the model output must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

/// Structured-output request, serialized the way the completions API expects:
/// `{"type": "json_schema", "json_schema": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

/// Sampling parameters. Anything left `None` is omitted from the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_a: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatParams {
    /// Layers `overrides` on top of `self`; any field set in `overrides` wins.
    pub fn merged_with(&self, overrides: &ChatParams) -> ChatParams {
        let o = overrides.clone();
        let base = self.clone();
        ChatParams {
            temperature: o.temperature.or(base.temperature),
            top_p: o.top_p.or(base.top_p),
            top_k: o.top_k.or(base.top_k),
            max_tokens: o.max_tokens.or(base.max_tokens),
            frequency_penalty: o.frequency_penalty.or(base.frequency_penalty),
            presence_penalty: o.presence_penalty.or(base.presence_penalty),
            repetition_penalty: o.repetition_penalty.or(base.repetition_penalty),
            min_p: o.min_p.or(base.min_p),
            top_a: o.top_a.or(base.top_a),
            seed: o.seed.or(base.seed),
            stop: o.stop.or(base.stop),
            response_format: o.response_format.or(base.response_format),
        }
    }

    /// Range checks run before any request leaves the process.
    pub fn validate(&self) -> Result<(), AiError> {
        fn check(ok: bool, msg: &str) -> Result<(), AiError> {
            if ok {
                Ok(())
            } else {
                Err(AiError::InvalidParameters(msg.to_string()))
            }
        }

        if let Some(t) = self.temperature {
            check((0.0..=2.0).contains(&t), "temperature must be between 0 and 2")?;
        }
        if let Some(p) = self.top_p {
            check((0.0..=1.0).contains(&p), "top_p must be between 0 and 1")?;
        }
        if let Some(k) = self.top_k {
            check(k >= 0, "top_k must be non-negative")?;
        }
        if let Some(m) = self.max_tokens {
            check(m >= 1, "max_tokens must be at least 1")?;
        }
        if let Some(f) = self.frequency_penalty {
            check(
                (-2.0..=2.0).contains(&f),
                "frequency_penalty must be between -2 and 2",
            )?;
        }
        if let Some(p) = self.presence_penalty {
            check(
                (-2.0..=2.0).contains(&p),
                "presence_penalty must be between -2 and 2",
            )?;
        }
        Ok(())
    }
}

//=========================================================================================
// Request / Response
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Falls back to the adapter's configured model.
    pub model: Option<String>,
    pub params: ChatParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub model: String,
}

/// Makes sure the conversation tells the model to answer with bare JSON.
///
/// The instruction is appended to the first system message, or inserted as a new
/// leading system message when there is none. Already-augmented messages are left alone.
pub fn augment_for_json_mode(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out = messages.to_vec();
    match out.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            if !system.content.contains(JSON_MODE_INSTRUCTION) {
                system.content = format!("{}\n\n{}", system.content, JSON_MODE_INSTRUCTION);
            }
        }
        None => out.insert(0, ChatMessage::system(JSON_MODE_INSTRUCTION)),
    }
    out
}

//=========================================================================================
// Errors & Retry
//=========================================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("API key is not configured")]
    MissingApiKey,
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Response is not valid JSON: {0}")]
    InvalidJsonResponse(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
}

impl AiError {
    /// Transient faults are retried by the adapter and reported to users as retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AiError::RateLimited(_)
                | AiError::ServiceUnavailable(_)
                | AiError::NetworkError(_)
                | AiError::Timeout
        )
    }

    /// Maps an unsuccessful HTTP status and its extracted message onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> AiError {
        match status {
            401 | 403 => AiError::AuthError(message),
            400 if message.to_lowercase().contains("model") => AiError::InvalidModel(message),
            400 => AiError::InvalidParameters(message),
            422 => AiError::SchemaValidationFailed(message),
            429 => AiError::RateLimited(message),
            503 | 504 => AiError::ServiceUnavailable(message),
            _ => AiError::ApiError { status, message },
        }
    }
}

/// Pulls a human-readable message out of an error body:
/// `{"error": "..."}`, `{"message": "..."}` or `{"error": {"message": "..."}}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Object(obj)) => {
            if let Some(Value::String(s)) = obj.get("message") {
                return Some(s.clone());
            }
        }
        _ => {}
    }
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Exponential backoff with random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before retrying after the given 1-based failed attempt:
    /// `base × 2^(attempt-1)` plus up to `max_jitter`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exp);
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(jitter)
    }
}

//! services/api/src/adapters/openrouter.rs
//!
//! Chat-completion adapter for OpenRouter's OpenAI-compatible API. Implements
//! the `ChatCompletionService` port: validates parameters before sending,
//! enforces JSON-only output when a response schema is requested, retries
//! transient failures with backoff, and maps HTTP failures onto `AiError`.

use std::time::Duration;

use async_trait::async_trait;
use flashcards_core::ai::{
    augment_for_json_mode, extract_error_message, AiError, ChatMessage, ChatParams, ChatRequest,
    ChatResponse, RetryPolicy,
};
use flashcards_core::domain::TokenUsage;
use flashcards_core::ports::ChatCompletionService;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A configured OpenRouter client.
#[derive(Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    default_params: ChatParams,
    retry: RetryPolicy,
    app_url: Option<String>,
    app_title: Option<String>,
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    params: &'a ChatParams,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: i32,
    completion_tokens: i32,
    total_tokens: i32,
}

//=========================================================================================
// Construction
//=========================================================================================

impl OpenRouterAdapter {
    /// Fails with `MissingApiKey` when the key is blank.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, AiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            default_params: ChatParams::default(),
            retry: RetryPolicy::default(),
            app_url: None,
            app_title: None,
        })
    }

    /// A copy of this adapter with some defaults replaced. `params` are layered on
    /// top of the existing default parameters.
    pub fn with_defaults(
        &self,
        base_url: Option<String>,
        model: Option<String>,
        params: Option<ChatParams>,
    ) -> Self {
        let mut next = self.clone();
        if let Some(url) = base_url {
            next.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = model {
            next.default_model = model;
        }
        if let Some(params) = params {
            next.default_params = self.default_params.merged_with(&params);
        }
        next
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attribution headers OpenRouter shows on its dashboards.
    pub fn with_app_info(mut self, url: impl Into<String>, title: impl Into<String>) -> Self {
        self.app_url = Some(url.into());
        self.app_title = Some(title.into());
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    //=====================================================================================
    // Single attempt
    //=====================================================================================

    async fn send_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatResponse, AiError> {
        let body = CompletionRequest {
            model,
            messages,
            params,
        };
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(url) = &self.app_url {
            request = request.header("HTTP-Referer", url);
        }
        if let Some(title) = &self.app_title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let message = extract_error_message(&text)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(AiError::from_status(status.as_u16(), message));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            AiError::ApiError {
                status: status.as_u16(),
                message: format!("Malformed completion response: {}", e),
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::ApiError {
                status: status.as_u16(),
                message: "Completion response contained no message content".to_string(),
            })?;

        if params.response_format.is_some() {
            serde_json::from_str::<serde_json::Value>(&content)
                .map_err(|e| AiError::InvalidJsonResponse(e.to_string()))?;
        }

        Ok(ChatResponse {
            content,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::NetworkError(e.to_string())
    }
}

//=========================================================================================
// `ChatCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatCompletionService for OpenRouterAdapter {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        if request.messages.is_empty() {
            return Err(AiError::InvalidParameters(
                "at least one message is required".to_string(),
            ));
        }
        let params = self.default_params.merged_with(&request.params);
        params.validate()?;

        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let messages = if params.response_format.is_some() {
            augment_for_json_mode(&request.messages)
        } else {
            request.messages.clone()
        };

        let mut attempt = 1;
        loop {
            match self.send_once(model, &messages, &params).await {
                Ok(response) => {
                    debug!(model = %response.model, attempt, "Chat completion succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient chat completion failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(attempts = attempt, error = %e, "Chat completion failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

//! crates/flashcards_core/src/generation.rs
//!
//! Sequences one flashcard generation: prompt → model call → parse → session row.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use crate::ai::{AiError, ChatMessage, ChatParams, ChatRequest, JsonSchemaFormat, ResponseFormat};
use crate::candidates::{parse_candidates, ParseError};
use crate::context::RequestContext;
use crate::domain::{GenerationSessionResult, NewGenerationSession};
use crate::ports::ChatCompletionService;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are an expert at creating educational flashcards. \
Analyze the provided text and extract the most important concepts, facts and definitions. \
For each one, write a flashcard with a clear, specific question on the front (at most 200 characters) \
and a concise, accurate answer on the back (at most 500 characters). \
Each flashcard must test a single piece of knowledge and be understandable without the source text. \
Generate between 3 and 10 flashcards.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("AI service is not configured")]
    ServiceNotConfigured,
    #[error("AI generation failed: {0}")]
    GenerationFailed(#[source] AiError),
    #[error("Could not parse AI response: {0}")]
    ResponseParseError(#[source] ParseError),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Generation timed out")]
    Timeout,
}

impl GenerationError {
    /// Whether the user should be offered a "try again". Nothing here is retried
    /// automatically; a retry is a fresh generation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::GenerationFailed(_)
                | GenerationError::ResponseParseError(_)
                | GenerationError::Timeout
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// The JSON schema the model output is constrained to.
pub fn flashcard_response_format() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: JsonSchemaFormat {
            name: "flashcard_candidates".to_string(),
            strict: true,
            schema: json!({
                "type": "object",
                "properties": {
                    "candidates": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "front": { "type": "string" },
                                "back": { "type": "string" }
                            },
                            "required": ["front", "back"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["candidates"],
                "additionalProperties": false
            }),
        },
    }
}

fn user_prompt(source_text: &str) -> String {
    format!(
        "Please analyze the following text and generate flashcard candidates:\n\n{}\n\n\
         Generate between 3-10 flashcards based on the key information in this text. \
         Return the result as JSON.",
        source_text
    )
}

#[derive(Clone)]
pub struct GenerationService {
    ai: Option<Arc<dyn ChatCompletionService>>,
    settings: GenerationSettings,
}

impl GenerationService {
    /// `ai` is `None` when no model provider is configured; every generation then
    /// fails with `ServiceNotConfigured`.
    pub fn new(ai: Option<Arc<dyn ChatCompletionService>>, settings: GenerationSettings) -> Self {
        Self { ai, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.ai.is_some()
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Runs one generation for the context's user. `source_text` is expected to
    /// have passed boundary validation already.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        source_text: &str,
    ) -> Result<GenerationSessionResult, GenerationError> {
        let Some(ai) = self.ai.as_ref() else {
            error!(user_id = %ctx.user_id, "Generation requested but no AI service is configured");
            return Err(GenerationError::ServiceNotConfigured);
        };

        let started = Instant::now();
        let input_length = source_text.chars().count() as i32;

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(user_prompt(source_text)),
            ],
            model: Some(self.settings.model.clone()),
            params: ChatParams {
                temperature: Some(self.settings.temperature),
                max_tokens: Some(self.settings.max_tokens),
                response_format: Some(flashcard_response_format()),
                ..ChatParams::default()
            },
        };

        let response = ai.chat(request).await.map_err(|e| {
            error!(user_id = %ctx.user_id, input_length, error = %e, "AI call failed during generation");
            GenerationError::GenerationFailed(e)
        })?;

        let candidates = parse_candidates(&response.content).map_err(|e| {
            error!(
                user_id = %ctx.user_id,
                model = %response.model,
                error = %e,
                "Failed to parse AI response into candidates"
            );
            GenerationError::ResponseParseError(e)
        })?;

        let generation_time_ms = started.elapsed().as_millis() as i64;

        let session = ctx
            .db
            .create_generation_session(NewGenerationSession {
                user_id: ctx.user_id,
                input_text: source_text.to_string(),
                input_length,
                generated_count: candidates.len() as i32,
                model_name: response.model.clone(),
                usage: response.usage,
            })
            .await
            .map_err(|e| {
                error!(
                    user_id = %ctx.user_id,
                    candidates = candidates.len(),
                    error = %e,
                    "Failed to persist generation session"
                );
                GenerationError::DatabaseError(e.to_string())
            })?;

        info!(
            user_id = %ctx.user_id,
            generation_session_id = session.id,
            candidates = candidates.len(),
            generation_time_ms,
            "Generation completed"
        );

        Ok(GenerationSessionResult {
            generation_session_id: session.id,
            input_length,
            candidates_generated: candidates.len() as i32,
            generation_time_ms,
            candidates,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChatResponse;
    use crate::domain::TokenUsage;
    use crate::memory::{FailPoint, InMemoryDatabase};
    use crate::ports::DatabaseService;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedChat {
        reply: Result<String, AiError>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedChat {
        fn new(reply: Result<String, AiError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompletionService for ScriptedChat {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
            self.seen.lock().unwrap().push(request);
            self.reply.clone().map(|content| ChatResponse {
                content,
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 20,
                    total_tokens: 30,
                }),
                model: "test/model".to_string(),
            })
        }
    }

    const THREE: &str = r#"{"candidates":[{"front":"Q1","back":"A1"},{"front":"Q2","back":"A2"},{"front":"Q3","back":"A3"}]}"#;

    fn ctx(db: &Arc<InMemoryDatabase>) -> RequestContext {
        RequestContext::new(Uuid::new_v4(), db.clone())
    }

    #[tokio::test]
    async fn successful_generation_persists_session() {
        let db = Arc::new(InMemoryDatabase::new());
        let chat = ScriptedChat::new(Ok(THREE.to_string()));
        let service = GenerationService::new(Some(chat.clone()), GenerationSettings::default());
        let ctx = ctx(&db);
        let text = "x".repeat(1500);

        let result = service.generate(&ctx, &text).await.unwrap();
        assert_eq!(result.candidates_generated, 3);
        assert_eq!(result.input_length, 1500);

        let session = db
            .get_generation_session(ctx.user_id, result.generation_session_id)
            .await
            .unwrap();
        assert_eq!(session.generated_count, 3);
        assert_eq!(session.model_name, "test/model");
        assert_eq!(session.total_tokens, Some(30));
        assert!(!session.is_completed());

        let seen = chat.seen.lock().unwrap();
        let params = &seen[0].params;
        assert_eq!(params.temperature, Some(0.3));
        assert_eq!(params.max_tokens, Some(2000));
        assert_eq!(params.response_format, Some(flashcard_response_format()));
        assert!(seen[0].messages[1].content.contains(&text));
    }

    #[tokio::test]
    async fn missing_ai_is_not_configured() {
        let db = Arc::new(InMemoryDatabase::new());
        let service = GenerationService::new(None, GenerationSettings::default());
        let err = service.generate(&ctx(&db), "text").await.unwrap_err();
        assert!(matches!(err, GenerationError::ServiceNotConfigured));
    }

    #[tokio::test]
    async fn ai_failure_is_generation_failed() {
        let db = Arc::new(InMemoryDatabase::new());
        let chat = ScriptedChat::new(Err(AiError::RateLimited("slow down".into())));
        let service = GenerationService::new(Some(chat), GenerationSettings::default());
        let err = service.generate(&ctx(&db), "text").await.unwrap_err();
        assert!(matches!(err, GenerationError::GenerationFailed(AiError::RateLimited(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unusable_output_is_parse_error() {
        let db = Arc::new(InMemoryDatabase::new());
        let chat = ScriptedChat::new(Ok(r#"{"candidates":[]}"#.to_string()));
        let service = GenerationService::new(Some(chat), GenerationSettings::default());
        let err = service.generate(&ctx(&db), "text").await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ResponseParseError(ParseError::NoCandidates)
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn store_failure_is_database_error() {
        let db = Arc::new(InMemoryDatabase::new());
        db.fail_next(FailPoint::CreateGenerationSession);
        let chat = ScriptedChat::new(Ok(THREE.to_string()));
        let service = GenerationService::new(Some(chat), GenerationSettings::default());
        let err = service.generate(&ctx(&db), "text").await.unwrap_err();
        assert!(matches!(err, GenerationError::DatabaseError(_)));
        assert!(!err.is_retryable());
    }
}

//! services/api/src/web/generations.rs
//!
//! The generation endpoint: source text in, reviewable candidates out.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use flashcards_core::context::RequestContext;
use flashcards_core::generation::GenerationError;
use flashcards_core::validation::validate_source_text;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::HttpError;
use crate::web::dto::{GenerateRequest, GenerationResponse};
use crate::web::state::AppState;

/// Generate flashcard candidates from a block of text.
///
/// The generation runs on its own task. If it outlives the configured timeout
/// the caller gets a 504 while the task still runs to completion.
#[utoipa::path(
    post,
    path = "/api/generations",
    tag = "generations",
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "Candidates generated", body = GenerationResponse),
        (status = 400, description = "Source text missing or outside 1000..=10000 characters"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "AI output could not be used or the session could not be stored"),
        (status = 503, description = "AI service not configured or unavailable"),
        (status = 504, description = "Generation timed out")
    )
)]
pub async fn create_generation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerationResponse>), HttpError> {
    // --- 1. Validate the input ---
    let Json(req) = payload?;
    let source_text = validate_source_text(&req.source_text)?;

    // --- 2. Run the generation under the timeout ---
    let user_id = ctx.user_id;
    let generation = state.generation.clone();
    let task = tokio::spawn(async move { generation.generate(&ctx, &source_text).await });

    match tokio::time::timeout(state.config.generation_timeout, task).await {
        Ok(Ok(result)) => {
            let result = result?;
            Ok((StatusCode::CREATED, Json(result.into())))
        }
        Ok(Err(join_err)) => {
            error!(%user_id, error = %join_err, "Generation task aborted");
            Err(HttpError::internal(format!("generation task aborted: {}", join_err)))
        }
        Err(_) => {
            warn!(
                %user_id,
                timeout_secs = state.config.generation_timeout.as_secs(),
                "Generation exceeded the request timeout"
            );
            Err(GenerationError::Timeout.into())
        }
    }
}

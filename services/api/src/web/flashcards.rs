//! services/api/src/web/flashcards.rs

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    http::StatusCode,
    Extension, Json,
};
use flashcards_core::context::RequestContext;
use flashcards_core::library;
use flashcards_core::validation::validate_patch;

use crate::error::HttpError;
use crate::web::dto::{FlashcardDto, UpdateFlashcardRequest};

/// Edit a flashcard's front, back, or both.
#[utoipa::path(
    patch,
    path = "/api/flashcards/{id}",
    tag = "flashcards",
    params(("id" = i64, Path, description = "Flashcard id")),
    request_body = UpdateFlashcardRequest,
    responses(
        (status = 200, description = "The updated flashcard", body = FlashcardDto),
        (status = 400, description = "Neither side given, or a side is invalid"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Flashcard not found")
    )
)]
pub async fn update_flashcard_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateFlashcardRequest>, JsonRejection>,
) -> Result<Json<FlashcardDto>, HttpError> {
    let Path(flashcard_id) = path?;
    let Json(req) = payload?;
    let patch = validate_patch(req.front.as_deref(), req.back.as_deref())?;
    let flashcard = library::update_flashcard(&ctx, flashcard_id, &patch).await?;
    Ok(Json(flashcard.into()))
}

#[utoipa::path(
    delete,
    path = "/api/flashcards/{id}",
    tag = "flashcards",
    params(("id" = i64, Path, description = "Flashcard id")),
    responses(
        (status = 204, description = "Flashcard deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Flashcard not found")
    )
)]
pub async fn delete_flashcard_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, HttpError> {
    let Path(flashcard_id) = path?;
    library::delete_flashcard(&ctx, flashcard_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

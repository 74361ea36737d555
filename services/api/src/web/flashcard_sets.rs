//! services/api/src/web/flashcard_sets.rs
//!
//! Flashcard set endpoints: creation (empty or from a generation session),
//! listing, detail, rename, delete, and adding a flashcard to a set.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    Extension, Json,
};
use flashcards_core::context::RequestContext;
use flashcards_core::validation::{
    validate_card_content, validate_create_set, validate_list_query, validate_title,
    CreateSetCommand, DecisionInput, RawListQuery,
};
use flashcards_core::{finalize, library};
use tracing::error;

use crate::error::HttpError;
use crate::web::dto::{
    CreateFlashcardRequest, CreateSetRequest, CreateSetResponse, CreatedFlashcardResponse,
    FlashcardSetDto, ListSetsParams, SetDetailResponse, SetListResponse, UpdateSetRequest,
};

/// Create a flashcard set.
///
/// With only a title the set starts empty. With `generation_session_id` and
/// `flashcards`, the accepted and edited decisions become the set's cards and
/// the generation session is closed. That write runs on its own task, so it
/// completes even if the caller goes away.
#[utoipa::path(
    post,
    path = "/api/flashcard-sets",
    tag = "flashcard-sets",
    request_body = CreateSetRequest,
    responses(
        (status = 201, description = "Set created", body = CreateSetResponse),
        (status = 400, description = "Invalid title or decisions, or nothing accepted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Generation session not found"),
        (status = 422, description = "Generation session already used"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_set_handler(
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<CreateSetRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSetResponse>), HttpError> {
    let Json(req) = payload?;
    let inputs: Option<Vec<DecisionInput>> = req
        .flashcards
        .as_ref()
        .map(|cards| cards.iter().map(DecisionInput::from).collect());
    let command = validate_create_set(&req.title, req.generation_session_id, inputs.as_deref())?;

    let response = match command {
        CreateSetCommand::Manual { title } => {
            let summary = finalize::create_empty_set(&ctx, &title).await?;
            CreateSetResponse {
                set: summary.into(),
                generation_metadata: None,
            }
        }
        CreateSetCommand::FromGeneration {
            title,
            generation_session_id,
            decisions,
        } => {
            let user_id = ctx.user_id;
            let task = tokio::spawn(async move {
                finalize::finalize_generation(&ctx, generation_session_id, &title, &decisions).await
            });
            let finalized = task.await.map_err(|join_err| {
                error!(%user_id, generation_session_id, error = %join_err, "Finalize task aborted");
                HttpError::internal(format!("finalize task aborted: {}", join_err))
            })??;
            CreateSetResponse {
                set: finalized.summary.into(),
                generation_metadata: Some(finalized.metadata.into()),
            }
        }
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// List the caller's flashcard sets.
#[utoipa::path(
    get,
    path = "/api/flashcard-sets",
    tag = "flashcard-sets",
    params(ListSetsParams),
    responses(
        (status = 200, description = "A page of sets", body = SetListResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_sets_handler(
    Extension(ctx): Extension<RequestContext>,
    params: Result<Query<ListSetsParams>, QueryRejection>,
) -> Result<Json<SetListResponse>, HttpError> {
    let Query(params) = params?;
    let query = validate_list_query(&RawListQuery::from(params))?;
    let page = library::list_sets(&ctx, &query).await?;
    Ok(Json(page.into()))
}

/// Get one set with its flashcards and their progress.
#[utoipa::path(
    get,
    path = "/api/flashcard-sets/{id}",
    tag = "flashcard-sets",
    params(("id" = i64, Path, description = "Set id")),
    responses(
        (status = 200, description = "The set", body = SetDetailResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Set not found")
    )
)]
pub async fn get_set_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<SetDetailResponse>, HttpError> {
    let Path(set_id) = path?;
    let detail = library::get_set_detail(&ctx, set_id).await?;
    Ok(Json(detail.into()))
}

/// Rename a set.
#[utoipa::path(
    patch,
    path = "/api/flashcard-sets/{id}",
    tag = "flashcard-sets",
    params(("id" = i64, Path, description = "Set id")),
    request_body = UpdateSetRequest,
    responses(
        (status = 200, description = "The renamed set", body = FlashcardSetDto),
        (status = 400, description = "Invalid title"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Set not found")
    )
)]
pub async fn update_set_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateSetRequest>, JsonRejection>,
) -> Result<Json<FlashcardSetDto>, HttpError> {
    let Path(set_id) = path?;
    let Json(req) = payload?;
    let title = validate_title(&req.title)?;
    library::update_set_title(&ctx, set_id, &title).await?;
    let summary = ctx.db.get_set_summary(ctx.user_id, set_id).await?;
    Ok(Json(summary.into()))
}

/// Delete a set together with its flashcards and their progress.
#[utoipa::path(
    delete,
    path = "/api/flashcard-sets/{id}",
    tag = "flashcard-sets",
    params(("id" = i64, Path, description = "Set id")),
    responses(
        (status = 204, description = "Set deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Set not found")
    )
)]
pub async fn delete_set_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, HttpError> {
    let Path(set_id) = path?;
    library::delete_set(&ctx, set_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add a flashcard to a set. The card starts in the `New` state, due now.
#[utoipa::path(
    post,
    path = "/api/flashcard-sets/{id}/flashcards",
    tag = "flashcard-sets",
    params(("id" = i64, Path, description = "Set id")),
    request_body = CreateFlashcardRequest,
    responses(
        (status = 201, description = "Flashcard created", body = CreatedFlashcardResponse),
        (status = 400, description = "Invalid front or back"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Set not found")
    )
)]
pub async fn create_flashcard_handler(
    Extension(ctx): Extension<RequestContext>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateFlashcardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedFlashcardResponse>), HttpError> {
    let Path(set_id) = path?;
    let Json(req) = payload?;
    let card = validate_card_content(&req.front, &req.back)?;
    let created = library::create_flashcard(&ctx, set_id, &card).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

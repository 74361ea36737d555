//! services/api/src/web/rest.rs
//!
//! Assembles the REST router and holds the master definition for the OpenAPI
//! specification.

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::{auth, dto, flashcard_sets, flashcards, generations, middleware::require_auth};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        generations::create_generation_handler,
        flashcard_sets::create_set_handler,
        flashcard_sets::list_sets_handler,
        flashcard_sets::get_set_handler,
        flashcard_sets::update_set_handler,
        flashcard_sets::delete_set_handler,
        flashcard_sets::create_flashcard_handler,
        flashcards::update_flashcard_handler,
        flashcards::delete_flashcard_handler,
    ),
    components(
        schemas(
            dto::RegisterRequest,
            dto::LoginRequest,
            dto::AuthResponse,
            dto::GenerateRequest,
            dto::GenerationResponse,
            dto::CandidateDto,
            dto::CreateSetRequest,
            dto::FlashcardDecisionDto,
            dto::CreateSetResponse,
            dto::GenerationMetadataDto,
            dto::UpdateSetRequest,
            dto::FlashcardSetDto,
            dto::SetListResponse,
            dto::PaginationDto,
            dto::SetDetailResponse,
            dto::FlashcardWithProgressDto,
            dto::ProgressSnapshotDto,
            dto::CreateFlashcardRequest,
            dto::CreatedFlashcardResponse,
            dto::FlashcardProgressDto,
            dto::UpdateFlashcardRequest,
            dto::FlashcardDto,
            dto::HealthResponse,
        )
    ),
    tags(
        (name = "auth", description = "Registration and sessions."),
        (name = "generations", description = "AI extraction of flashcard candidates."),
        (name = "flashcard-sets", description = "Stored sets and their flashcards."),
        (name = "flashcards", description = "Individual flashcards.")
    )
)]
pub struct ApiDoc;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = dto::HealthResponse))
)]
pub async fn health_handler() -> Json<dto::HealthResponse> {
    Json(dto::HealthResponse {
        status: "ok".to_string(),
    })
}

//=========================================================================================
// Router
//=========================================================================================

/// Builds the complete application: public and protected API routes, CORS,
/// request tracing and the Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = state
        .config
        .cors_allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ALLOWED_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/generations", post(generations::create_generation_handler))
        .route(
            "/flashcard-sets",
            post(flashcard_sets::create_set_handler).get(flashcard_sets::list_sets_handler),
        )
        .route(
            "/flashcard-sets/{id}",
            get(flashcard_sets::get_set_handler)
                .patch(flashcard_sets::update_set_handler)
                .delete(flashcard_sets::delete_set_handler),
        )
        .route(
            "/flashcard-sets/{id}/flashcards",
            post(flashcard_sets::create_flashcard_handler),
        )
        .route(
            "/flashcards/{id}",
            patch(flashcards::update_flashcard_handler).delete(flashcards::delete_flashcard_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes);

    let app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_router)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    Ok(app)
}

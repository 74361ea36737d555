//! services/api/src/web/dto.rs
//!
//! Request and response payloads of the REST API, with their OpenAPI schemas.
//! Request bodies default missing strings to empty so that absent fields are
//! reported by validation with the same field errors as blank ones.

use chrono::{DateTime, Utc};
use flashcards_core::domain::{
    CandidateFlashcard, CreatedFlashcard, Flashcard, FlashcardProgress, FlashcardSet,
    FlashcardSetDetail, FlashcardSetSummary, GenerationMetadata, GenerationSessionResult, Page,
    Pagination, ProgressSnapshot,
};
use flashcards_core::validation::{DecisionInput, RawListQuery};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Auth
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
}

//=========================================================================================
// Generation
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Between 1000 and 10000 characters.
    #[serde(default)]
    pub source_text: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CandidateDto {
    pub temp_id: Uuid,
    pub front: String,
    pub back: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct GenerationResponse {
    pub generation_session_id: i64,
    pub input_length: i32,
    pub candidates_generated: i32,
    pub generation_time_ms: i64,
    pub candidates: Vec<CandidateDto>,
    pub created_at: DateTime<Utc>,
}

impl From<CandidateFlashcard> for CandidateDto {
    fn from(c: CandidateFlashcard) -> Self {
        Self {
            temp_id: c.temp_id,
            front: c.front,
            back: c.back,
        }
    }
}

impl From<GenerationSessionResult> for GenerationResponse {
    fn from(r: GenerationSessionResult) -> Self {
        Self {
            generation_session_id: r.generation_session_id,
            input_length: r.input_length,
            candidates_generated: r.candidates_generated,
            generation_time_ms: r.generation_time_ms,
            candidates: r.candidates.into_iter().map(CandidateDto::from).collect(),
            created_at: r.created_at,
        }
    }
}

impl From<GenerationResponse> for GenerationSessionResult {
    fn from(r: GenerationResponse) -> Self {
        Self {
            generation_session_id: r.generation_session_id,
            input_length: r.input_length,
            candidates_generated: r.candidates_generated,
            generation_time_ms: r.generation_time_ms,
            candidates: r
                .candidates
                .into_iter()
                .map(|c| CandidateFlashcard {
                    temp_id: c.temp_id,
                    front: c.front,
                    back: c.back,
                })
                .collect(),
            created_at: r.created_at,
        }
    }
}

//=========================================================================================
// Flashcard Sets
//=========================================================================================

/// One reviewed candidate. `action` is one of `accepted`, `edited`, `rejected`.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlashcardDecisionDto {
    #[serde(default)]
    pub temp_id: String,
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
    #[serde(default)]
    pub action: String,
    pub was_edited: Option<bool>,
}

impl From<&FlashcardDecisionDto> for DecisionInput {
    fn from(d: &FlashcardDecisionDto) -> Self {
        Self {
            temp_id: d.temp_id.clone(),
            front: d.front.clone(),
            back: d.back.clone(),
            action: d.action.clone(),
            was_edited: d.was_edited,
        }
    }
}

/// With only `title`, creates an empty set. With `generation_session_id` and
/// `flashcards`, finalizes a generation session into a set.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateSetRequest {
    #[serde(default)]
    pub title: String,
    pub generation_session_id: Option<i64>,
    pub flashcards: Option<Vec<FlashcardDecisionDto>>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSetRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlashcardSetDto {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub cards_count: i32,
    pub due_cards_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashcardSetDto {
    pub fn new(set: FlashcardSet, due_cards_count: i64) -> Self {
        Self {
            id: set.id,
            user_id: set.user_id,
            title: set.title,
            cards_count: set.cards_count,
            due_cards_count,
            created_at: set.created_at,
            updated_at: set.updated_at,
        }
    }
}

impl From<FlashcardSetSummary> for FlashcardSetDto {
    fn from(s: FlashcardSetSummary) -> Self {
        Self::new(s.set, s.due_cards_count)
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct GenerationMetadataDto {
    pub generation_session_id: i64,
    pub candidates_accepted: usize,
    pub candidates_rejected: usize,
    pub candidates_edited: usize,
    pub acceptance_rate: f64,
}

impl From<GenerationMetadata> for GenerationMetadataDto {
    fn from(m: GenerationMetadata) -> Self {
        Self {
            generation_session_id: m.generation_session_id,
            candidates_accepted: m.candidates_accepted,
            candidates_rejected: m.candidates_rejected,
            candidates_edited: m.candidates_edited,
            acceptance_rate: m.acceptance_rate,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateSetResponse {
    #[serde(flatten)]
    pub set: FlashcardSetDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_metadata: Option<GenerationMetadataDto>,
}

/// Query string of the set listing. Values are validated after extraction so
/// that malformed numbers come back as field errors.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSetsParams {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Items per page, 1 to 100 (default 20).
    pub limit: Option<String>,
    /// Case-insensitive title substring.
    pub search: Option<String>,
    /// `created_at` (default), `updated_at` or `title`.
    pub sort: Option<String>,
    /// `asc` or `desc` (default).
    pub order: Option<String>,
}

impl From<ListSetsParams> for RawListQuery {
    fn from(p: ListSetsParams) -> Self {
        Self {
            page: p.page,
            limit: p.limit,
            search: p.search,
            sort: p.sort,
            order: p.order,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginationDto {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
}

impl From<Pagination> for PaginationDto {
    fn from(p: Pagination) -> Self {
        Self {
            current_page: p.current_page,
            total_pages: p.total_pages,
            total_items: p.total_items,
            items_per_page: p.items_per_page,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SetListResponse {
    pub data: Vec<FlashcardSetDto>,
    pub pagination: PaginationDto,
}

impl From<Page<FlashcardSetSummary>> for SetListResponse {
    fn from(page: Page<FlashcardSetSummary>) -> Self {
        Self {
            data: page.items.into_iter().map(FlashcardSetDto::from).collect(),
            pagination: page.pagination.into(),
        }
    }
}

//=========================================================================================
// Flashcards
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateFlashcardRequest {
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
}

/// At least one of `front` and `back` must be present.
#[derive(Deserialize, ToSchema)]
pub struct UpdateFlashcardRequest {
    pub front: Option<String>,
    pub back: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlashcardDto {
    pub id: i64,
    pub flashcard_set_id: i64,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Flashcard> for FlashcardDto {
    fn from(f: Flashcard) -> Self {
        Self {
            id: f.id,
            flashcard_set_id: f.flashcard_set_id,
            front: f.front,
            back: f.back,
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshotDto {
    /// `New`, `Learning`, `Review` or `Relearning`.
    pub state: String,
    pub due: DateTime<Utc>,
    pub reps: i32,
    pub lapses: i32,
}

impl From<ProgressSnapshot> for ProgressSnapshotDto {
    fn from(p: ProgressSnapshot) -> Self {
        Self {
            state: p.state.as_str().to_string(),
            due: p.due,
            reps: p.reps,
            lapses: p.lapses,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlashcardProgressDto {
    pub id: i64,
    pub state: String,
    pub due: DateTime<Utc>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub elapsed_days: Option<i32>,
    pub scheduled_days: Option<i32>,
    pub reps: i32,
    pub lapses: i32,
    pub last_review: Option<DateTime<Utc>>,
}

impl From<FlashcardProgress> for FlashcardProgressDto {
    fn from(p: FlashcardProgress) -> Self {
        Self {
            id: p.id,
            state: p.state.as_str().to_string(),
            due: p.due,
            stability: p.stability,
            difficulty: p.difficulty,
            elapsed_days: p.elapsed_days,
            scheduled_days: p.scheduled_days,
            reps: p.reps,
            lapses: p.lapses,
            last_review: p.last_review,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlashcardWithProgressDto {
    #[serde(flatten)]
    pub flashcard: FlashcardDto,
    pub progress: ProgressSnapshotDto,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreatedFlashcardResponse {
    #[serde(flatten)]
    pub flashcard: FlashcardDto,
    pub progress: FlashcardProgressDto,
}

impl From<CreatedFlashcard> for CreatedFlashcardResponse {
    fn from(c: CreatedFlashcard) -> Self {
        Self {
            flashcard: c.flashcard.into(),
            progress: c.progress.into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SetDetailResponse {
    #[serde(flatten)]
    pub set: FlashcardSetDto,
    pub flashcards: Vec<FlashcardWithProgressDto>,
}

impl From<FlashcardSetDetail> for SetDetailResponse {
    fn from(d: FlashcardSetDetail) -> Self {
        Self {
            set: d.summary.into(),
            flashcards: d
                .flashcards
                .into_iter()
                .map(|(flashcard, progress)| FlashcardWithProgressDto {
                    flashcard: flashcard.into(),
                    progress: progress.into(),
                })
                .collect(),
        }
    }
}

//=========================================================================================
// Misc
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

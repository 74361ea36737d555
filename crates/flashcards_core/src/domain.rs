//! crates/flashcards_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Persisted entities carry no storage or wire concerns; only the types that
//! live on the client side of the review flow derive `serde` traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Users & Auth
//=========================================================================================

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// A signed-in session: the opaque token the client presents on later requests.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Generation
//=========================================================================================

/// Token accounting reported by the AI service for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

/// One AI extraction run, retained for audit.
///
/// `completed_at` stays `None` until the session is finalized into a set;
/// once set, the session is terminal.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: i64,
    pub user_id: Uuid,
    pub input_text: String,
    pub input_length: i32,
    pub generated_count: i32,
    pub accepted_count: i32,
    pub model_name: String,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub cost_usd: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationSession {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// The row written at the end of a successful generation.
#[derive(Debug, Clone)]
pub struct NewGenerationSession {
    pub user_id: Uuid,
    pub input_text: String,
    pub input_length: i32,
    pub generated_count: i32,
    pub model_name: String,
    pub usage: Option<TokenUsage>,
}

/// An AI-proposed flashcard that has not been committed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFlashcard {
    pub temp_id: Uuid,
    pub front: String,
    pub back: String,
}

/// What the caller of a generation gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSessionResult {
    pub generation_session_id: i64,
    pub input_length: i32,
    pub candidates_generated: i32,
    pub generation_time_ms: i64,
    pub candidates: Vec<CandidateFlashcard>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Review decisions
//=========================================================================================

/// The final verdict on a candidate as submitted for finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Accepted,
    Edited,
    Rejected,
}

impl DecisionAction {
    /// `edited` counts as accepted everywhere.
    pub fn is_kept(self) -> bool {
        matches!(self, DecisionAction::Accepted | DecisionAction::Edited)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDecision {
    pub temp_id: String,
    pub front: String,
    pub back: String,
    pub action: DecisionAction,
    #[serde(default)]
    pub was_edited: bool,
}

/// Bookkeeping returned alongside a set created from a generation session.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMetadata {
    pub generation_session_id: i64,
    /// Pure accepts, i.e. kept minus edited.
    pub candidates_accepted: usize,
    pub candidates_rejected: usize,
    pub candidates_edited: usize,
    pub acceptance_rate: f64,
}

//=========================================================================================
// Sets, Flashcards & Progress
//=========================================================================================

#[derive(Debug, Clone)]
pub struct FlashcardSet {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    /// Maintained by the store.
    pub cards_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A set joined with the number of its cards that are due now.
#[derive(Debug, Clone)]
pub struct FlashcardSetSummary {
    pub set: FlashcardSet,
    pub due_cards_count: i64,
}

#[derive(Debug, Clone)]
pub struct Flashcard {
    pub id: i64,
    pub flashcard_set_id: i64,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content for a flashcard about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlashcard {
    pub front: String,
    pub back: String,
}

/// A partial update; at least one side is present once validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashcardPatch {
    pub front: Option<String>,
    pub back: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    New,
    Learning,
    Review,
    Relearning,
}

impl ProgressState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressState::New => "New",
            ProgressState::Learning => "Learning",
            ProgressState::Review => "Review",
            ProgressState::Relearning => "Relearning",
        }
    }
}

impl std::str::FromStr for ProgressState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(ProgressState::New),
            "Learning" => Ok(ProgressState::Learning),
            "Review" => Ok(ProgressState::Review),
            "Relearning" => Ok(ProgressState::Relearning),
            other => Err(format!("unknown progress state '{}'", other)),
        }
    }
}

/// The full progress row, 1:1 with a flashcard.
#[derive(Debug, Clone)]
pub struct FlashcardProgress {
    pub id: i64,
    pub flashcard_id: i64,
    pub state: ProgressState,
    pub due: DateTime<Utc>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub elapsed_days: Option<i32>,
    pub scheduled_days: Option<i32>,
    pub reps: i32,
    pub lapses: i32,
    pub last_review: Option<DateTime<Utc>>,
}

/// The part of a progress row shown next to a flashcard in a set listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub state: ProgressState,
    pub due: DateTime<Utc>,
    pub reps: i32,
    pub lapses: i32,
}

impl ProgressSnapshot {
    /// The state every new flashcard starts in: new and due immediately.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            state: ProgressState::New,
            due: now,
            reps: 0,
            lapses: 0,
        }
    }
}

/// A flashcard together with its progress row, as read from the store.
#[derive(Debug, Clone)]
pub struct FlashcardWithProgress {
    pub flashcard: Flashcard,
    pub progress: Option<ProgressSnapshot>,
}

/// A flashcard freshly inserted together with its paired progress row.
#[derive(Debug, Clone)]
pub struct CreatedFlashcard {
    pub flashcard: Flashcard,
    pub progress: FlashcardProgress,
}

/// A set with every flashcard and its (never missing) progress.
#[derive(Debug, Clone)]
pub struct FlashcardSetDetail {
    pub summary: FlashcardSetSummary,
    pub flashcards: Vec<(Flashcard, ProgressSnapshot)>,
}

//=========================================================================================
// Listing
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Title,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
}

impl SetListQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for SetListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            sort: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
}

impl Pagination {
    pub fn new(query: &SetListQuery, total_items: u64) -> Self {
        let per_page = u64::from(query.limit.max(1));
        Self {
            current_page: query.page,
            total_pages: total_items.div_ceil(per_page),
            total_items,
            items_per_page: query.limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

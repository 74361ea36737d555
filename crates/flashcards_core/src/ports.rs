//! crates/flashcards_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ai::{AiError, ChatRequest, ChatResponse};
use crate::domain::{
    AuthSession, AuthUser, CreatedFlashcard, Flashcard, FlashcardPatch, FlashcardSet,
    FlashcardSetSummary, FlashcardWithProgress, GenerationSession, NewFlashcard,
    NewGenerationSession, SetListQuery, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Everything the core persists. Every set/flashcard operation is scoped by the
/// owning user; rows belonging to someone else behave exactly like missing rows.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<AuthUser>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live (unexpired) session token to its user.
    async fn validate_auth_session(&self, token: &str) -> PortResult<AuthUser>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;

    // --- Generation Sessions ---
    async fn create_generation_session(
        &self,
        session: NewGenerationSession,
    ) -> PortResult<GenerationSession>;

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: i64,
    ) -> PortResult<GenerationSession>;

    async fn complete_generation_session(
        &self,
        session_id: i64,
        accepted_count: i32,
    ) -> PortResult<()>;

    // --- Flashcard Sets ---

    /// Creates the set, its flashcards and one `New` progress row per flashcard
    /// as a single unit: either all rows exist afterwards or none do.
    async fn create_set_with_flashcards(
        &self,
        user_id: Uuid,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<FlashcardSet>;

    /// Takes the one-time claim on an unfinished generation session and writes
    /// the set exactly like `create_set_with_flashcards`, all in the same unit.
    /// Returns `None` (and writes nothing) when the session was already claimed
    /// or completed. If the write fails the claim is not kept.
    async fn create_set_from_generation(
        &self,
        user_id: Uuid,
        generation_session_id: i64,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<Option<FlashcardSet>>;

    async fn get_set_summary(&self, user_id: Uuid, set_id: i64) -> PortResult<FlashcardSetSummary>;

    /// Returns one page of sets plus the total number of matching sets.
    async fn list_sets(
        &self,
        user_id: Uuid,
        query: &SetListQuery,
    ) -> PortResult<(Vec<FlashcardSetSummary>, u64)>;

    /// Flashcards of an owned set, oldest first.
    async fn list_flashcards_with_progress(
        &self,
        user_id: Uuid,
        set_id: i64,
    ) -> PortResult<Vec<FlashcardWithProgress>>;

    async fn update_set_title(
        &self,
        user_id: Uuid,
        set_id: i64,
        title: &str,
    ) -> PortResult<FlashcardSet>;

    /// Returns `false` when nothing owned by the user matched.
    async fn delete_set(&self, user_id: Uuid, set_id: i64) -> PortResult<bool>;

    // --- Flashcards ---

    /// Inserts a flashcard and its progress row as one unit.
    async fn create_flashcard(
        &self,
        user_id: Uuid,
        set_id: i64,
        card: &NewFlashcard,
    ) -> PortResult<CreatedFlashcard>;

    async fn update_flashcard(
        &self,
        user_id: Uuid,
        flashcard_id: i64,
        patch: &FlashcardPatch,
    ) -> PortResult<Flashcard>;

    async fn delete_flashcard(&self, user_id: Uuid, flashcard_id: i64) -> PortResult<bool>;
}

/// A chat-completion API with structured-output support.
#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AiError>;
}

/// The identity provider. The rest of the system only ever calls these four.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_out(&self, token: &str) -> PortResult<()>;

    async fn get_user(&self, token: &str) -> PortResult<AuthUser>;
}

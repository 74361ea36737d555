//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashcards_core::domain::{
    AuthUser, CreatedFlashcard, Flashcard, FlashcardPatch, FlashcardProgress, FlashcardSet,
    FlashcardSetSummary, FlashcardWithProgress, GenerationSession, NewFlashcard,
    NewGenerationSession, ProgressSnapshot, ProgressState, SetListQuery, SortOrder,
    UserCredentials,
};
use flashcards_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => PortError::Unexpected(other.to_string()),
    }
}

/// `%term%` for ILIKE, with the pattern metacharacters of `term` escaped.
fn ilike_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AuthUserRecord {
    user_id: Uuid,
    email: String,
}
impl AuthUserRecord {
    fn to_domain(self) -> AuthUser {
        AuthUser {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct UserCredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserCredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

const GENERATION_SESSION_COLUMNS: &str = "id, user_id, input_text, input_length, generated_count, \
     accepted_count, model_name, prompt_tokens, completion_tokens, total_tokens, cost_usd, \
     started_at, completed_at";

#[derive(FromRow)]
struct GenerationSessionRecord {
    id: i64,
    user_id: Uuid,
    input_text: String,
    input_length: i32,
    generated_count: i32,
    accepted_count: i32,
    model_name: String,
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
    total_tokens: Option<i32>,
    cost_usd: Option<f64>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}
impl GenerationSessionRecord {
    fn to_domain(self) -> GenerationSession {
        GenerationSession {
            id: self.id,
            user_id: self.user_id,
            input_text: self.input_text,
            input_length: self.input_length,
            generated_count: self.generated_count,
            accepted_count: self.accepted_count,
            model_name: self.model_name,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            cost_usd: self.cost_usd,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

const SET_COLUMNS: &str = "id, user_id, title, cards_count, created_at, updated_at";

#[derive(FromRow)]
struct FlashcardSetRecord {
    id: i64,
    user_id: Uuid,
    title: String,
    cards_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl FlashcardSetRecord {
    fn to_domain(self) -> FlashcardSet {
        FlashcardSet {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            cards_count: self.cards_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FlashcardSetSummaryRecord {
    #[sqlx(flatten)]
    set: FlashcardSetRecord,
    due_cards_count: i64,
}
impl FlashcardSetSummaryRecord {
    fn to_domain(self) -> FlashcardSetSummary {
        FlashcardSetSummary {
            set: self.set.to_domain(),
            due_cards_count: self.due_cards_count,
        }
    }
}

const FLASHCARD_COLUMNS: &str = "id, flashcard_set_id, front, back, created_at, updated_at";

#[derive(FromRow)]
struct FlashcardRecord {
    id: i64,
    flashcard_set_id: i64,
    front: String,
    back: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            flashcard_set_id: self.flashcard_set_id,
            front: self.front,
            back: self.back,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn parse_state(raw: &str) -> PortResult<ProgressState> {
    raw.parse::<ProgressState>().map_err(PortError::Unexpected)
}

#[derive(FromRow)]
struct FlashcardWithProgressRecord {
    #[sqlx(flatten)]
    flashcard: FlashcardRecord,
    state: Option<String>,
    due: Option<DateTime<Utc>>,
    reps: Option<i32>,
    lapses: Option<i32>,
}
impl FlashcardWithProgressRecord {
    fn to_domain(self) -> PortResult<FlashcardWithProgress> {
        let progress = match (self.state, self.due) {
            (Some(state), Some(due)) => Some(ProgressSnapshot {
                state: parse_state(&state)?,
                due,
                reps: self.reps.unwrap_or(0),
                lapses: self.lapses.unwrap_or(0),
            }),
            _ => None,
        };
        Ok(FlashcardWithProgress {
            flashcard: self.flashcard.to_domain(),
            progress,
        })
    }
}

const PROGRESS_COLUMNS: &str = "id, flashcard_id, state, due, stability, difficulty, \
     elapsed_days, scheduled_days, reps, lapses, last_review";

#[derive(FromRow)]
struct ProgressRecord {
    id: i64,
    flashcard_id: i64,
    state: String,
    due: DateTime<Utc>,
    stability: Option<f64>,
    difficulty: Option<f64>,
    elapsed_days: Option<i32>,
    scheduled_days: Option<i32>,
    reps: i32,
    lapses: i32,
    last_review: Option<DateTime<Utc>>,
}
impl ProgressRecord {
    fn to_domain(self) -> PortResult<FlashcardProgress> {
        Ok(FlashcardProgress {
            id: self.id,
            flashcard_id: self.flashcard_id,
            state: parse_state(&self.state)?,
            due: self.due,
            stability: self.stability,
            difficulty: self.difficulty,
            elapsed_days: self.elapsed_days,
            scheduled_days: self.scheduled_days,
            reps: self.reps,
            lapses: self.lapses,
            last_review: self.last_review,
        })
    }
}

/// Inserts a set, its flashcards and one `New` progress row per flashcard
/// inside the caller's transaction.
async fn insert_set(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    title: &str,
    cards: &[NewFlashcard],
) -> PortResult<FlashcardSet> {
    let sql = format!(
        "INSERT INTO flashcard_sets (user_id, title) VALUES ($1, $2) RETURNING {}",
        SET_COLUMNS
    );
    let set = sqlx::query_as::<_, FlashcardSetRecord>(&sql)
        .bind(user_id)
        .bind(title)
        .fetch_one(&mut **tx)
        .await
        .map_err(unexpected)?;

    if !cards.is_empty() {
        let fronts: Vec<String> = cards.iter().map(|c| c.front.clone()).collect();
        let backs: Vec<String> = cards.iter().map(|c| c.back.clone()).collect();
        let ids: Vec<i64> = sqlx::query_scalar(
            "INSERT INTO flashcards (flashcard_set_id, front, back) \
             SELECT $1, f, b FROM UNNEST($2::text[], $3::text[]) AS t(f, b) \
             RETURNING id",
        )
        .bind(set.id)
        .bind(&fronts)
        .bind(&backs)
        .fetch_all(&mut **tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO flashcard_progress (flashcard_id, state, due, reps, lapses) \
             SELECT id, 'New', now(), 0, 0 FROM UNNEST($1::bigint[]) AS t(id)",
        )
        .bind(&ids)
        .execute(&mut **tx)
        .await
        .map_err(unexpected)?;
    }

    Ok(set.to_domain())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthUserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("User with email {} already exists", email))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthUserRecord>(
            "SELECT u.user_id, u.email FROM auth_sessions a \
             JOIN users u ON u.user_id = a.user_id \
             WHERE a.id = $1 AND a.expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;
        Ok(record.to_domain())
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Generation Sessions ---
    async fn create_generation_session(
        &self,
        session: NewGenerationSession,
    ) -> PortResult<GenerationSession> {
        let sql = format!(
            "INSERT INTO generation_sessions \
             (user_id, input_text, input_length, generated_count, model_name, \
              prompt_tokens, completion_tokens, total_tokens) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            GENERATION_SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, GenerationSessionRecord>(&sql)
            .bind(session.user_id)
            .bind(&session.input_text)
            .bind(session.input_length)
            .bind(session.generated_count)
            .bind(&session.model_name)
            .bind(session.usage.map(|u| u.prompt_tokens))
            .bind(session.usage.map(|u| u.completion_tokens))
            .bind(session.usage.map(|u| u.total_tokens))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: i64,
    ) -> PortResult<GenerationSession> {
        let sql = format!(
            "SELECT {} FROM generation_sessions WHERE id = $1 AND user_id = $2",
            GENERATION_SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, GenerationSessionRecord>(&sql)
            .bind(session_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!(
                "Generation session {} not found",
                session_id
            )))?;
        Ok(record.to_domain())
    }

    async fn complete_generation_session(
        &self,
        session_id: i64,
        accepted_count: i32,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE generation_sessions SET completed_at = now(), accepted_count = $2 WHERE id = $1",
        )
        .bind(session_id)
        .bind(accepted_count)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Generation session {} not found",
                session_id
            )));
        }
        Ok(())
    }

    // --- Flashcard Sets ---
    async fn create_set_with_flashcards(
        &self,
        user_id: Uuid,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<FlashcardSet> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let set = insert_set(&mut tx, user_id, title, cards).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(set)
    }

    async fn create_set_from_generation(
        &self,
        user_id: Uuid,
        generation_session_id: i64,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<Option<FlashcardSet>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Rolled back together with the set rows if anything below fails.
        let claimed = sqlx::query(
            "UPDATE generation_sessions SET claimed_at = now() \
             WHERE id = $1 AND user_id = $2 AND claimed_at IS NULL AND completed_at IS NULL",
        )
        .bind(generation_session_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if claimed.rows_affected() != 1 {
            tx.rollback().await.map_err(unexpected)?;
            return Ok(None);
        }

        let set = insert_set(&mut tx, user_id, title, cards).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(Some(set))
    }

    async fn get_set_summary(&self, user_id: Uuid, set_id: i64) -> PortResult<FlashcardSetSummary> {
        let sql = format!(
            "SELECT {}, due_cards_count FROM flashcard_sets_with_due_count \
             WHERE id = $1 AND user_id = $2",
            SET_COLUMNS
        );
        let record = sqlx::query_as::<_, FlashcardSetSummaryRecord>(&sql)
            .bind(set_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Flashcard set {}", set_id)))?;
        Ok(record.to_domain())
    }

    async fn list_sets(
        &self,
        user_id: Uuid,
        query: &SetListQuery,
    ) -> PortResult<(Vec<FlashcardSetSummary>, u64)> {
        let pattern = query.search.as_deref().map(ilike_pattern);
        let direction = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM flashcard_sets \
             WHERE user_id = $1 AND ($2::text IS NULL OR title ILIKE $2)",
        )
        .bind(user_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        // The sort column comes from a closed enum, never from user text.
        let sql = format!(
            "SELECT {cols}, due_cards_count FROM flashcard_sets_with_due_count \
             WHERE user_id = $1 AND ($2::text IS NULL OR title ILIKE $2) \
             ORDER BY {col} {dir}, id {dir} LIMIT $3 OFFSET $4",
            cols = SET_COLUMNS,
            col = query.sort.column(),
            dir = direction,
        );
        let records = sqlx::query_as::<_, FlashcardSetSummaryRecord>(&sql)
            .bind(user_id)
            .bind(&pattern)
            .bind(i64::from(query.limit))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let items = records.into_iter().map(|r| r.to_domain()).collect();
        Ok((items, total.max(0) as u64))
    }

    async fn list_flashcards_with_progress(
        &self,
        user_id: Uuid,
        set_id: i64,
    ) -> PortResult<Vec<FlashcardWithProgress>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM flashcard_sets WHERE id = $1 AND user_id = $2")
            .bind(set_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Flashcard set {}", set_id)))?;

        let records = sqlx::query_as::<_, FlashcardWithProgressRecord>(
            "SELECT f.id, f.flashcard_set_id, f.front, f.back, f.created_at, f.updated_at, \
                    p.state, p.due, p.reps, p.lapses \
             FROM flashcards f \
             LEFT JOIN flashcard_progress p ON p.flashcard_id = f.id \
             WHERE f.flashcard_set_id = $1 \
             ORDER BY f.created_at ASC, f.id ASC",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_set_title(
        &self,
        user_id: Uuid,
        set_id: i64,
        title: &str,
    ) -> PortResult<FlashcardSet> {
        let sql = format!(
            "UPDATE flashcard_sets SET title = $1 WHERE id = $2 AND user_id = $3 RETURNING {}",
            SET_COLUMNS
        );
        let record = sqlx::query_as::<_, FlashcardSetRecord>(&sql)
            .bind(title)
            .bind(set_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Flashcard set {}", set_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_set(&self, user_id: Uuid, set_id: i64) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM flashcard_sets WHERE id = $1 AND user_id = $2")
            .bind(set_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    // --- Flashcards ---
    async fn create_flashcard(
        &self,
        user_id: Uuid,
        set_id: i64,
        card: &NewFlashcard,
    ) -> PortResult<CreatedFlashcard> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM flashcard_sets WHERE id = $1 AND user_id = $2")
            .bind(set_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(not_found_or_unexpected(format!("Flashcard set {}", set_id)))?;

        let sql = format!(
            "INSERT INTO flashcards (flashcard_set_id, front, back) VALUES ($1, $2, $3) RETURNING {}",
            FLASHCARD_COLUMNS
        );
        let flashcard = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(set_id)
            .bind(&card.front)
            .bind(&card.back)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;

        let sql = format!(
            "INSERT INTO flashcard_progress (flashcard_id, state, due, reps, lapses) \
             VALUES ($1, 'New', now(), 0, 0) RETURNING {}",
            PROGRESS_COLUMNS
        );
        let progress = sqlx::query_as::<_, ProgressRecord>(&sql)
            .bind(flashcard.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(CreatedFlashcard {
            flashcard: flashcard.to_domain(),
            progress: progress.to_domain()?,
        })
    }

    async fn update_flashcard(
        &self,
        user_id: Uuid,
        flashcard_id: i64,
        patch: &FlashcardPatch,
    ) -> PortResult<Flashcard> {
        let record = sqlx::query_as::<_, FlashcardRecord>(
            "UPDATE flashcards f \
             SET front = COALESCE($1, f.front), back = COALESCE($2, f.back) \
             FROM flashcard_sets s \
             WHERE f.id = $3 AND s.id = f.flashcard_set_id AND s.user_id = $4 \
             RETURNING f.id, f.flashcard_set_id, f.front, f.back, f.created_at, f.updated_at",
        )
        .bind(&patch.front)
        .bind(&patch.back)
        .bind(flashcard_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Flashcard {}", flashcard_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_flashcard(&self, user_id: Uuid, flashcard_id: i64) -> PortResult<bool> {
        let result = sqlx::query(
            "DELETE FROM flashcards f USING flashcard_sets s \
             WHERE f.id = $1 AND s.id = f.flashcard_set_id AND s.user_id = $2",
        )
        .bind(flashcard_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(ilike_pattern("bio"), "%bio%");
        assert_eq!(ilike_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}

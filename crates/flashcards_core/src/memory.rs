//! crates/flashcards_core/src/memory.rs
//!
//! An in-process `DatabaseService` that keeps the same guarantees as the
//! relational store: set writes are all-or-nothing, deleting a set cascades to
//! its flashcards and their progress, `cards_count` follows the flashcard rows,
//! and a generation session can be claimed only once.
//!
//! Used by the test suites and by `DATABASE_URL=memory://` local runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuthUser, CreatedFlashcard, Flashcard, FlashcardPatch, FlashcardProgress, FlashcardSet,
    FlashcardSetSummary, FlashcardWithProgress, GenerationSession, NewFlashcard,
    NewGenerationSession, ProgressSnapshot, ProgressState, SetListQuery, SortField, SortOrder,
    UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Operations that can be told to fail once, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateGenerationSession,
    GetGenerationSession,
    CreateSetWithFlashcards,
    CompleteGenerationSession,
    GetSetSummary,
    ListSets,
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: GenerationSession,
    claimed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserCredentials>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    generation_sessions: BTreeMap<i64, StoredSession>,
    sets: BTreeMap<i64, FlashcardSet>,
    flashcards: BTreeMap<i64, Flashcard>,
    // keyed by flashcard id
    progress: BTreeMap<i64, FlashcardProgress>,
    next_id: i64,
    fail_points: HashSet<FailPoint>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn trip(&mut self, point: FailPoint) -> PortResult<()> {
        if self.fail_points.remove(&point) {
            return Err(PortError::Unexpected(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    fn owned_set(&self, user_id: Uuid, set_id: i64) -> PortResult<&FlashcardSet> {
        self.sets
            .get(&set_id)
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("flashcard set {}", set_id)))
    }

    fn owned_flashcard_set_id(&self, user_id: Uuid, flashcard_id: i64) -> PortResult<i64> {
        let set_id = self
            .flashcards
            .get(&flashcard_id)
            .map(|f| f.flashcard_set_id)
            .ok_or_else(|| PortError::NotFound(format!("flashcard {}", flashcard_id)))?;
        self.owned_set(user_id, set_id)
            .map_err(|_| PortError::NotFound(format!("flashcard {}", flashcard_id)))?;
        Ok(set_id)
    }

    fn summary(&self, set: &FlashcardSet, now: DateTime<Utc>) -> FlashcardSetSummary {
        let due_cards_count = self
            .flashcards
            .values()
            .filter(|f| f.flashcard_set_id == set.id)
            .filter(|f| self.progress.get(&f.id).is_some_and(|p| p.due <= now))
            .count() as i64;
        FlashcardSetSummary {
            set: set.clone(),
            due_cards_count,
        }
    }

    fn insert_flashcard(
        &mut self,
        set_id: i64,
        card: &NewFlashcard,
        now: DateTime<Utc>,
    ) -> CreatedFlashcard {
        let flashcard = Flashcard {
            id: self.next_id(),
            flashcard_set_id: set_id,
            front: card.front.clone(),
            back: card.back.clone(),
            created_at: now,
            updated_at: now,
        };
        let initial = ProgressSnapshot::initial(now);
        let progress = FlashcardProgress {
            id: self.next_id(),
            flashcard_id: flashcard.id,
            state: initial.state,
            due: initial.due,
            stability: None,
            difficulty: None,
            elapsed_days: None,
            scheduled_days: None,
            reps: initial.reps,
            lapses: initial.lapses,
            last_review: None,
        };
        self.flashcards.insert(flashcard.id, flashcard.clone());
        self.progress.insert(flashcard.id, progress.clone());
        if let Some(set) = self.sets.get_mut(&set_id) {
            set.cards_count += 1;
        }
        CreatedFlashcard { flashcard, progress }
    }

    // The returned row is the one as inserted; the count is read back later.
    fn insert_set(&mut self, user_id: Uuid, title: &str, cards: &[NewFlashcard]) -> FlashcardSet {
        let now = Utc::now();
        let set = FlashcardSet {
            id: self.next_id(),
            user_id,
            title: title.to_string(),
            cards_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.sets.insert(set.id, set.clone());
        for card in cards {
            self.insert_flashcard(set.id, card, now);
        }
        set
    }

    fn remove_flashcard(&mut self, flashcard_id: i64) {
        self.progress.remove(&flashcard_id);
        if let Some(card) = self.flashcards.remove(&flashcard_id) {
            if let Some(set) = self.sets.get_mut(&card.flashcard_set_id) {
                set.cards_count -= 1;
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryDatabase {
    state: Mutex<MemoryState>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> PortResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PortError::Unexpected("in-memory store lock poisoned".to_string()))
    }

    /// Makes the next call of the given operation fail with `PortError::Unexpected`.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_points.insert(point);
        }
    }

    /// Drops a progress row without touching its flashcard.
    pub fn remove_progress(&self, flashcard_id: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.progress.remove(&flashcard_id);
        }
    }

    pub fn set_count(&self) -> usize {
        self.state.lock().map(|s| s.sets.len()).unwrap_or(0)
    }

    pub fn flashcard_count(&self) -> usize {
        self.state.lock().map(|s| s.flashcards.len()).unwrap_or(0)
    }

    pub fn progress_count(&self) -> usize {
        self.state.lock().map(|s| s.progress.len()).unwrap_or(0)
    }

    /// `None` if the session does not exist; otherwise whether it is claimed.
    pub fn is_claimed(&self, session_id: i64) -> Option<bool> {
        let state = self.state.lock().ok()?;
        state
            .generation_sessions
            .get(&session_id)
            .map(|s| s.claimed_at.is_some())
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<AuthUser> {
        let mut state = self.state()?;
        if state.users.contains_key(email) {
            return Err(PortError::Conflict(format!("user {} already exists", email)));
        }
        let user_id = Uuid::new_v4();
        state.users.insert(
            email.to_string(),
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(AuthUser {
            user_id,
            email: email.to_string(),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.state()?
            .users
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {}", email)))
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.state()?
            .auth_sessions
            .insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<AuthUser> {
        let state = self.state()?;
        let (user_id, expires_at) = state
            .auth_sessions
            .get(token)
            .copied()
            .ok_or(PortError::Unauthorized)?;
        if expires_at <= Utc::now() {
            return Err(PortError::Unauthorized);
        }
        state
            .users
            .values()
            .find(|u| u.user_id == user_id)
            .map(|u| AuthUser {
                user_id: u.user_id,
                email: u.email.clone(),
            })
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        self.state()?.auth_sessions.remove(token);
        Ok(())
    }

    // --- Generation Sessions ---
    async fn create_generation_session(
        &self,
        new: NewGenerationSession,
    ) -> PortResult<GenerationSession> {
        let mut state = self.state()?;
        state.trip(FailPoint::CreateGenerationSession)?;
        let session = GenerationSession {
            id: state.next_id(),
            user_id: new.user_id,
            input_text: new.input_text,
            input_length: new.input_length,
            generated_count: new.generated_count,
            accepted_count: 0,
            model_name: new.model_name,
            prompt_tokens: new.usage.map(|u| u.prompt_tokens),
            completion_tokens: new.usage.map(|u| u.completion_tokens),
            total_tokens: new.usage.map(|u| u.total_tokens),
            cost_usd: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        state.generation_sessions.insert(
            session.id,
            StoredSession {
                session: session.clone(),
                claimed_at: None,
            },
        );
        Ok(session)
    }

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: i64,
    ) -> PortResult<GenerationSession> {
        let mut state = self.state()?;
        state.trip(FailPoint::GetGenerationSession)?;
        state
            .generation_sessions
            .get(&session_id)
            .filter(|s| s.session.user_id == user_id)
            .map(|s| s.session.clone())
            .ok_or_else(|| PortError::NotFound(format!("generation session {}", session_id)))
    }

    async fn complete_generation_session(
        &self,
        session_id: i64,
        accepted_count: i32,
    ) -> PortResult<()> {
        let mut state = self.state()?;
        state.trip(FailPoint::CompleteGenerationSession)?;
        let stored = state
            .generation_sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("generation session {}", session_id)))?;
        stored.session.accepted_count = accepted_count;
        stored.session.completed_at = Some(Utc::now());
        Ok(())
    }

    // --- Flashcard Sets ---
    async fn create_set_with_flashcards(
        &self,
        user_id: Uuid,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<FlashcardSet> {
        let mut state = self.state()?;
        // Fails before anything is written, so a failure leaves no rows behind.
        state.trip(FailPoint::CreateSetWithFlashcards)?;
        Ok(state.insert_set(user_id, title, cards))
    }

    async fn create_set_from_generation(
        &self,
        user_id: Uuid,
        generation_session_id: i64,
        title: &str,
        cards: &[NewFlashcard],
    ) -> PortResult<Option<FlashcardSet>> {
        let mut state = self.state()?;
        let claimable = state
            .generation_sessions
            .get(&generation_session_id)
            .is_some_and(|s| {
                s.session.user_id == user_id
                    && s.claimed_at.is_none()
                    && s.session.completed_at.is_none()
            });
        if !claimable {
            return Ok(None);
        }
        state.trip(FailPoint::CreateSetWithFlashcards)?;
        if let Some(stored) = state.generation_sessions.get_mut(&generation_session_id) {
            stored.claimed_at = Some(Utc::now());
        }
        Ok(Some(state.insert_set(user_id, title, cards)))
    }

    async fn get_set_summary(&self, user_id: Uuid, set_id: i64) -> PortResult<FlashcardSetSummary> {
        let mut state = self.state()?;
        state.trip(FailPoint::GetSetSummary)?;
        let set = state.owned_set(user_id, set_id)?;
        Ok(state.summary(set, Utc::now()))
    }

    async fn list_sets(
        &self,
        user_id: Uuid,
        query: &SetListQuery,
    ) -> PortResult<(Vec<FlashcardSetSummary>, u64)> {
        let mut state = self.state()?;
        state.trip(FailPoint::ListSets)?;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<&FlashcardSet> = state
            .sets
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| {
                needle
                    .as_ref()
                    .map_or(true, |n| s.title.to_lowercase().contains(n.as_str()))
            })
            .collect();
        matching.sort_by(|a, b| {
            let ordering = match query.sort {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Title => a.title.cmp(&b.title),
            }
            .then(a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        let now = Utc::now();
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(|s| state.summary(s, now))
            .collect();
        Ok((items, total))
    }

    async fn list_flashcards_with_progress(
        &self,
        user_id: Uuid,
        set_id: i64,
    ) -> PortResult<Vec<FlashcardWithProgress>> {
        let state = self.state()?;
        state.owned_set(user_id, set_id)?;
        let mut cards: Vec<FlashcardWithProgress> = state
            .flashcards
            .values()
            .filter(|f| f.flashcard_set_id == set_id)
            .map(|f| FlashcardWithProgress {
                flashcard: f.clone(),
                progress: state.progress.get(&f.id).map(|p| ProgressSnapshot {
                    state: p.state,
                    due: p.due,
                    reps: p.reps,
                    lapses: p.lapses,
                }),
            })
            .collect();
        cards.sort_by(|a, b| {
            a.flashcard
                .created_at
                .cmp(&b.flashcard.created_at)
                .then(a.flashcard.id.cmp(&b.flashcard.id))
        });
        Ok(cards)
    }

    async fn update_set_title(
        &self,
        user_id: Uuid,
        set_id: i64,
        title: &str,
    ) -> PortResult<FlashcardSet> {
        let mut state = self.state()?;
        state.owned_set(user_id, set_id)?;
        let set = state
            .sets
            .get_mut(&set_id)
            .ok_or_else(|| PortError::NotFound(format!("flashcard set {}", set_id)))?;
        set.title = title.to_string();
        set.updated_at = Utc::now();
        Ok(set.clone())
    }

    async fn delete_set(&self, user_id: Uuid, set_id: i64) -> PortResult<bool> {
        let mut state = self.state()?;
        if state.owned_set(user_id, set_id).is_err() {
            return Ok(false);
        }
        let card_ids: Vec<i64> = state
            .flashcards
            .values()
            .filter(|f| f.flashcard_set_id == set_id)
            .map(|f| f.id)
            .collect();
        for id in card_ids {
            state.remove_flashcard(id);
        }
        state.sets.remove(&set_id);
        Ok(true)
    }

    // --- Flashcards ---
    async fn create_flashcard(
        &self,
        user_id: Uuid,
        set_id: i64,
        card: &NewFlashcard,
    ) -> PortResult<CreatedFlashcard> {
        let mut state = self.state()?;
        state.owned_set(user_id, set_id)?;
        Ok(state.insert_flashcard(set_id, card, Utc::now()))
    }

    async fn update_flashcard(
        &self,
        user_id: Uuid,
        flashcard_id: i64,
        patch: &FlashcardPatch,
    ) -> PortResult<Flashcard> {
        let mut state = self.state()?;
        state.owned_flashcard_set_id(user_id, flashcard_id)?;
        let card = state
            .flashcards
            .get_mut(&flashcard_id)
            .ok_or_else(|| PortError::NotFound(format!("flashcard {}", flashcard_id)))?;
        if let Some(front) = &patch.front {
            card.front = front.clone();
        }
        if let Some(back) = &patch.back {
            card.back = back.clone();
        }
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    async fn delete_flashcard(&self, user_id: Uuid, flashcard_id: i64) -> PortResult<bool> {
        let mut state = self.state()?;
        if state.owned_flashcard_set_id(user_id, flashcard_id).is_err() {
            return Ok(false);
        }
        state.remove_flashcard(flashcard_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(front: &str) -> NewFlashcard {
        NewFlashcard {
            front: front.to_string(),
            back: "answer".to_string(),
        }
    }

    #[tokio::test]
    async fn set_write_pairs_every_card_with_new_progress() {
        let db = InMemoryDatabase::new();
        let user = Uuid::new_v4();
        let set = db
            .create_set_with_flashcards(user, "Bio", &[card("a"), card("b")])
            .await
            .unwrap();
        assert_eq!(set.cards_count, 0);

        let summary = db.get_set_summary(user, set.id).await.unwrap();
        assert_eq!(summary.set.cards_count, 2);
        assert_eq!(summary.due_cards_count, 2);

        let cards = db.list_flashcards_with_progress(user, set.id).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards
            .iter()
            .all(|c| c.progress.as_ref().map(|p| p.state) == Some(ProgressState::New)));
    }

    #[tokio::test]
    async fn failed_set_write_leaves_nothing_behind() {
        let db = InMemoryDatabase::new();
        db.fail_next(FailPoint::CreateSetWithFlashcards);
        let result = db
            .create_set_with_flashcards(Uuid::new_v4(), "Bio", &[card("a")])
            .await;
        assert!(result.is_err());
        assert_eq!(db.set_count(), 0);
        assert_eq!(db.flashcard_count(), 0);
        assert_eq!(db.progress_count(), 0);
    }

    #[tokio::test]
    async fn delete_set_cascades() {
        let db = InMemoryDatabase::new();
        let user = Uuid::new_v4();
        let set = db
            .create_set_with_flashcards(user, "Bio", &[card("a"), card("b")])
            .await
            .unwrap();
        assert!(!db.delete_set(Uuid::new_v4(), set.id).await.unwrap());
        assert!(db.delete_set(user, set.id).await.unwrap());
        assert_eq!(db.flashcard_count(), 0);
        assert_eq!(db.progress_count(), 0);
        assert!(!db.delete_set(user, set.id).await.unwrap());
    }

    #[tokio::test]
    async fn generation_claim_is_taken_with_the_set_write() {
        let db = InMemoryDatabase::new();
        let user = Uuid::new_v4();
        let session = db
            .create_generation_session(NewGenerationSession {
                user_id: user,
                input_text: "x".into(),
                input_length: 1,
                generated_count: 3,
                model_name: "m".into(),
                usage: None,
            })
            .await
            .unwrap();

        // a stranger cannot claim it
        let foreign = db
            .create_set_from_generation(Uuid::new_v4(), session.id, "Bio", &[card("a")])
            .await
            .unwrap();
        assert!(foreign.is_none());

        // a failed write keeps no claim and no rows
        db.fail_next(FailPoint::CreateSetWithFlashcards);
        assert!(db
            .create_set_from_generation(user, session.id, "Bio", &[card("a")])
            .await
            .is_err());
        assert_eq!(db.is_claimed(session.id), Some(false));
        assert_eq!(db.set_count(), 0);

        let set = db
            .create_set_from_generation(user, session.id, "Bio", &[card("a"), card("b")])
            .await
            .unwrap();
        assert!(set.is_some());
        assert_eq!(db.is_claimed(session.id), Some(true));
        assert_eq!(db.flashcard_count(), 2);

        let again = db
            .create_set_from_generation(user, session.id, "Bio", &[card("a")])
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(db.set_count(), 1);
    }

    #[tokio::test]
    async fn flashcards_of_other_users_look_missing() {
        let db = InMemoryDatabase::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let set = db
            .create_set_with_flashcards(owner, "Bio", &[card("a")])
            .await
            .unwrap();
        let id = db.list_flashcards_with_progress(owner, set.id).await.unwrap()[0]
            .flashcard
            .id;

        let patch = FlashcardPatch {
            front: Some("b".into()),
            back: None,
        };
        assert!(matches!(
            db.update_flashcard(stranger, id, &patch).await,
            Err(PortError::NotFound(_))
        ));
        assert!(!db.delete_flashcard(stranger, id).await.unwrap());
        assert!(matches!(
            db.create_flashcard(stranger, set.id, &card("c")).await,
            Err(PortError::NotFound(_))
        ));
        assert!(db.delete_flashcard(owner, id).await.unwrap());
        assert_eq!(db.get_set_summary(owner, set.id).await.unwrap().set.cards_count, 0);
    }

    #[tokio::test]
    async fn listing_searches_sorts_and_pages() {
        let db = InMemoryDatabase::new();
        let user = Uuid::new_v4();
        for title in ["Biology", "Chemistry", "Marine biology", "Art"] {
            db.create_set_with_flashcards(user, title, &[]).await.unwrap();
        }
        db.create_set_with_flashcards(Uuid::new_v4(), "Biology", &[])
            .await
            .unwrap();

        let query = SetListQuery {
            search: Some("BIO".into()),
            sort: SortField::Title,
            order: SortOrder::Asc,
            ..SetListQuery::default()
        };
        let (items, total) = db.list_sets(user, &query).await.unwrap();
        assert_eq!(total, 2);
        let titles: Vec<_> = items.iter().map(|s| s.set.title.as_str()).collect();
        assert_eq!(titles, ["Biology", "Marine biology"]);

        let query = SetListQuery {
            page: 2,
            limit: 3,
            sort: SortField::Title,
            order: SortOrder::Desc,
            ..SetListQuery::default()
        };
        let (items, total) = db.list_sets(user, &query).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].set.title, "Art");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = InMemoryDatabase::new();
        db.create_user_with_email("a@b.co", "h").await.unwrap();
        assert!(matches!(
            db.create_user_with_email("a@b.co", "h").await,
            Err(PortError::Conflict(_))
        ));
    }
}

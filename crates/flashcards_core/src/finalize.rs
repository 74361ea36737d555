//! crates/flashcards_core/src/finalize.rs
//!
//! Creating flashcard sets: empty ones by hand, and populated ones from the
//! reviewed candidates of a generation session.
//!
//! A generation session can be finalized at most once. The stored session is
//! read first as a fast check. The authoritative guard is the store's one-time
//! claim, taken in the same unit as the set write, so a failed or abandoned
//! write never leaves a claimed session without a set.

use tracing::{error, info, warn};

use crate::context::RequestContext;
use crate::domain::{
    DecisionAction, FlashcardDecision, FlashcardSetSummary, GenerationMetadata, NewFlashcard,
};
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("Generation session {0} not found")]
    SessionNotFound(i64),
    #[error("Generation session {0} has already been used to create a set")]
    SessionAlreadyUsed(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// A set created from a generation session.
#[derive(Debug, Clone)]
pub struct FinalizedSet {
    pub summary: FlashcardSetSummary,
    pub metadata: GenerationMetadata,
}

/// Creates an empty set owned by the context's user.
pub async fn create_empty_set(
    ctx: &RequestContext,
    title: &str,
) -> Result<FlashcardSetSummary, FinalizeError> {
    let set = ctx
        .db
        .create_set_with_flashcards(ctx.user_id, title, &[])
        .await
        .map_err(|e| {
            error!(user_id = %ctx.user_id, error = %e, "Failed to create flashcard set");
            FinalizeError::DatabaseError(e.to_string())
        })?;
    info!(user_id = %ctx.user_id, set_id = set.id, "Created empty flashcard set");
    Ok(FlashcardSetSummary {
        set,
        due_cards_count: 0,
    })
}

/// Counts decisions into the metadata reported after finalization.
/// `candidates_accepted` counts pure accepts only; the rate counts edits as kept.
pub fn generation_metadata(
    generation_session_id: i64,
    decisions: &[FlashcardDecision],
) -> GenerationMetadata {
    let count = |a: DecisionAction| decisions.iter().filter(|d| d.action == a).count();
    let accepted = count(DecisionAction::Accepted);
    let edited = count(DecisionAction::Edited);
    let rejected = count(DecisionAction::Rejected);
    let total = decisions.len();
    let acceptance_rate = if total == 0 {
        0.0
    } else {
        (((accepted + edited) as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
    };
    GenerationMetadata {
        generation_session_id,
        candidates_accepted: accepted,
        candidates_rejected: rejected,
        candidates_edited: edited,
        acceptance_rate,
    }
}

/// Persists the kept decisions of a generation session as a new set and closes
/// the session out.
pub async fn finalize_generation(
    ctx: &RequestContext,
    generation_session_id: i64,
    title: &str,
    decisions: &[FlashcardDecision],
) -> Result<FinalizedSet, FinalizeError> {
    let user_id = ctx.user_id;

    // --- 1. Idempotency guard ---
    let session = match ctx.db.get_generation_session(user_id, generation_session_id).await {
        Ok(session) => session,
        Err(PortError::NotFound(_)) => {
            warn!(%user_id, generation_session_id, "Finalize requested for unknown generation session");
            return Err(FinalizeError::SessionNotFound(generation_session_id));
        }
        Err(e) => {
            error!(%user_id, generation_session_id, error = %e, "Failed to load generation session");
            return Err(FinalizeError::DatabaseError(e.to_string()));
        }
    };
    if session.is_completed() {
        warn!(%user_id, generation_session_id, "Generation session already finalized");
        return Err(FinalizeError::SessionAlreadyUsed(generation_session_id));
    }

    // --- 2. Partition decisions ---
    let cards: Vec<NewFlashcard> = decisions
        .iter()
        .filter(|d| d.action.is_kept())
        .map(|d| NewFlashcard {
            front: d.front.clone(),
            back: d.back.clone(),
        })
        .collect();

    // --- 3-5. Claim, then set, flashcards and progress rows as one unit ---
    let inserted = match ctx
        .db
        .create_set_from_generation(user_id, generation_session_id, title, &cards)
        .await
    {
        Ok(Some(set)) => set,
        Ok(None) => {
            warn!(%user_id, generation_session_id, "Generation session claimed by a concurrent request");
            return Err(FinalizeError::SessionAlreadyUsed(generation_session_id));
        }
        Err(e) => {
            error!(%user_id, generation_session_id, error = %e, "Failed to create set from generation");
            return Err(FinalizeError::DatabaseError(e.to_string()));
        }
    };

    // --- 6. Close out the session; the set stands even if this fails ---
    if let Err(e) = ctx
        .db
        .complete_generation_session(generation_session_id, cards.len() as i32)
        .await
    {
        error!(
            %user_id,
            generation_session_id,
            set_id = inserted.id,
            error = %e,
            "Failed to mark generation session completed"
        );
    }

    // --- 7. Read back and report ---
    let accepted = cards.len() as i64;
    let summary = match ctx.db.get_set_summary(user_id, inserted.id).await {
        Ok(summary) => FlashcardSetSummary {
            due_cards_count: accepted,
            ..summary
        },
        Err(e) => {
            warn!(set_id = inserted.id, error = %e, "Could not re-read created set; using inserted row");
            FlashcardSetSummary {
                set: inserted,
                due_cards_count: accepted,
            }
        }
    };
    let metadata = generation_metadata(generation_session_id, decisions);

    info!(
        %user_id,
        generation_session_id,
        set_id = summary.set.id,
        cards = accepted,
        acceptance_rate = metadata.acceptance_rate,
        "Created flashcard set from generation"
    );
    Ok(FinalizedSet { summary, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewGenerationSession, ProgressState};
    use crate::memory::{FailPoint, InMemoryDatabase};
    use crate::ports::DatabaseService;
    use std::sync::Arc;
    use uuid::Uuid;

    fn decision(action: DecisionAction, front: &str, back: &str) -> FlashcardDecision {
        FlashcardDecision {
            temp_id: Uuid::new_v4().to_string(),
            front: front.to_string(),
            back: back.to_string(),
            action,
            was_edited: action == DecisionAction::Edited,
        }
    }

    async fn setup(generated: i32) -> (Arc<InMemoryDatabase>, RequestContext, i64) {
        let db = Arc::new(InMemoryDatabase::new());
        let ctx = RequestContext::new(Uuid::new_v4(), db.clone());
        let session = db
            .create_generation_session(NewGenerationSession {
                user_id: ctx.user_id,
                input_text: "text".into(),
                input_length: 4,
                generated_count: generated,
                model_name: "m".into(),
                usage: None,
            })
            .await
            .unwrap();
        (db, ctx, session.id)
    }

    #[test]
    fn acceptance_rate_arithmetic() {
        let mut decisions = Vec::new();
        decisions.extend((0..6).map(|_| decision(DecisionAction::Accepted, "q", "a")));
        decisions.extend((0..2).map(|_| decision(DecisionAction::Edited, "q", "a")));
        decisions.extend((0..2).map(|_| decision(DecisionAction::Rejected, "q", "a")));

        let m = generation_metadata(3, &decisions);
        assert_eq!(m.acceptance_rate, 80.0);
        assert_eq!(m.candidates_accepted, 6);
        assert_eq!(m.candidates_edited, 2);
        assert_eq!(m.candidates_rejected, 2);

        let third = [
            decision(DecisionAction::Accepted, "q", "a"),
            decision(DecisionAction::Rejected, "q", "a"),
            decision(DecisionAction::Rejected, "q", "a"),
        ];
        assert_eq!(generation_metadata(1, &third).acceptance_rate, 33.33);
    }

    #[tokio::test]
    async fn finalize_writes_edited_content_with_progress() {
        let (db, ctx, session_id) = setup(3).await;
        let decisions = [
            decision(DecisionAction::Accepted, "Q1", "A1"),
            decision(DecisionAction::Edited, "X2", "Y2"),
            decision(DecisionAction::Rejected, "Q3", "A3"),
        ];

        let out = finalize_generation(&ctx, session_id, "My Set", &decisions)
            .await
            .unwrap();
        assert_eq!(out.summary.set.cards_count, 2);
        assert_eq!(out.summary.due_cards_count, 2);
        assert_eq!(out.metadata.candidates_accepted, 1);
        assert_eq!(out.metadata.candidates_edited, 1);

        let cards = db
            .list_flashcards_with_progress(ctx.user_id, out.summary.set.id)
            .await
            .unwrap();
        let contents: Vec<_> = cards
            .iter()
            .map(|c| (c.flashcard.front.as_str(), c.flashcard.back.as_str()))
            .collect();
        assert_eq!(contents, [("Q1", "A1"), ("X2", "Y2")]);
        assert!(cards
            .iter()
            .all(|c| c.progress.as_ref().map(|p| p.state) == Some(ProgressState::New)));
        assert_eq!(db.progress_count(), 2);

        let session = db.get_generation_session(ctx.user_id, session_id).await.unwrap();
        assert!(session.is_completed());
        assert_eq!(session.accepted_count, 2);
    }

    #[tokio::test]
    async fn second_finalize_is_rejected() {
        let (db, ctx, session_id) = setup(1).await;
        let decisions = [decision(DecisionAction::Accepted, "Q", "A")];
        finalize_generation(&ctx, session_id, "One", &decisions).await.unwrap();
        let err = finalize_generation(&ctx, session_id, "Two", &decisions)
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::SessionAlreadyUsed(id) if id == session_id));
        assert_eq!(db.set_count(), 1);
        assert_eq!(db.flashcard_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_finalize_writes_one_set() {
        let (db, ctx, session_id) = setup(1).await;
        let decisions = [decision(DecisionAction::Accepted, "Q", "A")];
        let (first, second) = tokio::join!(
            finalize_generation(&ctx, session_id, "One", &decisions),
            finalize_generation(&ctx, session_id, "Two", &decisions),
        );
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert!(matches!(
            first.err().or(second.err()),
            Some(FinalizeError::SessionAlreadyUsed(_))
        ));
        assert_eq!(db.set_count(), 1);
    }

    #[tokio::test]
    async fn unknown_or_foreign_session_is_not_found() {
        let (db, _ctx, session_id) = setup(1).await;
        let stranger = RequestContext::new(Uuid::new_v4(), db.clone());
        let decisions = [decision(DecisionAction::Accepted, "Q", "A")];
        assert!(matches!(
            finalize_generation(&stranger, session_id, "Mine", &decisions).await,
            Err(FinalizeError::SessionNotFound(_))
        ));
        assert!(matches!(
            finalize_generation(&stranger, 9999, "Mine", &decisions).await,
            Err(FinalizeError::SessionNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn failed_write_keeps_no_claim() {
        let (db, ctx, session_id) = setup(1).await;
        let decisions = [decision(DecisionAction::Accepted, "Q", "A")];
        db.fail_next(FailPoint::CreateSetWithFlashcards);

        let err = finalize_generation(&ctx, session_id, "Set", &decisions)
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::DatabaseError(_)));
        assert_eq!(db.is_claimed(session_id), Some(false));
        assert_eq!(db.flashcard_count(), 0);

        finalize_generation(&ctx, session_id, "Set", &decisions).await.unwrap();
        assert_eq!(db.flashcard_count(), 1);
    }

    #[tokio::test]
    async fn completion_failure_is_swallowed() {
        let (db, ctx, session_id) = setup(1).await;
        let decisions = [decision(DecisionAction::Accepted, "Q", "A")];
        db.fail_next(FailPoint::CompleteGenerationSession);

        let out = finalize_generation(&ctx, session_id, "Set", &decisions).await.unwrap();
        assert_eq!(out.summary.set.cards_count, 1);
        // still claimed, so it cannot be finalized a second time
        assert!(matches!(
            finalize_generation(&ctx, session_id, "Again", &decisions).await,
            Err(FinalizeError::SessionAlreadyUsed(_))
        ));
    }

    #[tokio::test]
    async fn reread_failure_falls_back_to_inserted_row() {
        let (db, ctx, session_id) = setup(2).await;
        let decisions = [
            decision(DecisionAction::Accepted, "Q", "A"),
            decision(DecisionAction::Accepted, "Q2", "A2"),
        ];
        db.fail_next(FailPoint::GetSetSummary);

        let out = finalize_generation(&ctx, session_id, "Set", &decisions).await.unwrap();
        assert_eq!(out.summary.set.title, "Set");
        assert_eq!(out.summary.set.cards_count, 0);
        assert_eq!(out.summary.due_cards_count, 2);
    }

    #[tokio::test]
    async fn empty_set_has_no_due_cards() {
        let db = Arc::new(InMemoryDatabase::new());
        let ctx = RequestContext::new(Uuid::new_v4(), db.clone());
        let summary = create_empty_set(&ctx, "Manual").await.unwrap();
        assert_eq!(summary.set.title, "Manual");
        assert_eq!(summary.set.cards_count, 0);
        assert_eq!(summary.due_cards_count, 0);
        assert_eq!(db.flashcard_count(), 0);
    }
}

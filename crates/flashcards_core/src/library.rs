//! crates/flashcards_core/src/library.rs
//!
//! Everyday operations on stored sets and flashcards. Every call is scoped to
//! the context's user; another user's rows are reported as not found.

use chrono::Utc;
use tracing::{error, warn};

use crate::context::RequestContext;
use crate::domain::{
    CreatedFlashcard, Flashcard, FlashcardPatch, FlashcardSet, FlashcardSetDetail,
    FlashcardSetSummary, NewFlashcard, Page, Pagination, ProgressSnapshot, SetListQuery,
};
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

fn wrap(ctx: &RequestContext, op: &'static str, e: PortError) -> LibraryError {
    match e {
        PortError::NotFound(what) => LibraryError::NotFound(what),
        other => {
            error!(user_id = %ctx.user_id, op, error = %other, "Library operation failed");
            LibraryError::DatabaseError(other.to_string())
        }
    }
}

pub async fn list_sets(
    ctx: &RequestContext,
    query: &SetListQuery,
) -> Result<Page<FlashcardSetSummary>, LibraryError> {
    let (items, total) = ctx
        .db
        .list_sets(ctx.user_id, query)
        .await
        .map_err(|e| wrap(ctx, "list_sets", e))?;
    Ok(Page {
        items,
        pagination: Pagination::new(query, total),
    })
}

pub async fn get_set_detail(
    ctx: &RequestContext,
    set_id: i64,
) -> Result<FlashcardSetDetail, LibraryError> {
    let summary = ctx
        .db
        .get_set_summary(ctx.user_id, set_id)
        .await
        .map_err(|e| wrap(ctx, "get_set_summary", e))?;
    let rows = ctx
        .db
        .list_flashcards_with_progress(ctx.user_id, set_id)
        .await
        .map_err(|e| wrap(ctx, "list_flashcards_with_progress", e))?;

    let now = Utc::now();
    let flashcards = rows
        .into_iter()
        .map(|row| {
            let progress = row.progress.unwrap_or_else(|| {
                warn!(flashcard_id = row.flashcard.id, set_id, "Flashcard has no progress row");
                ProgressSnapshot::initial(now)
            });
            (row.flashcard, progress)
        })
        .collect();
    Ok(FlashcardSetDetail {
        summary,
        flashcards,
    })
}

pub async fn update_set_title(
    ctx: &RequestContext,
    set_id: i64,
    title: &str,
) -> Result<FlashcardSet, LibraryError> {
    ctx.db
        .update_set_title(ctx.user_id, set_id, title)
        .await
        .map_err(|e| wrap(ctx, "update_set_title", e))
}

pub async fn delete_set(ctx: &RequestContext, set_id: i64) -> Result<(), LibraryError> {
    let deleted = ctx
        .db
        .delete_set(ctx.user_id, set_id)
        .await
        .map_err(|e| wrap(ctx, "delete_set", e))?;
    if !deleted {
        return Err(LibraryError::NotFound(format!("flashcard set {}", set_id)));
    }
    Ok(())
}

pub async fn create_flashcard(
    ctx: &RequestContext,
    set_id: i64,
    card: &NewFlashcard,
) -> Result<CreatedFlashcard, LibraryError> {
    ctx.db
        .create_flashcard(ctx.user_id, set_id, card)
        .await
        .map_err(|e| wrap(ctx, "create_flashcard", e))
}

pub async fn update_flashcard(
    ctx: &RequestContext,
    flashcard_id: i64,
    patch: &FlashcardPatch,
) -> Result<Flashcard, LibraryError> {
    ctx.db
        .update_flashcard(ctx.user_id, flashcard_id, patch)
        .await
        .map_err(|e| wrap(ctx, "update_flashcard", e))
}

pub async fn delete_flashcard(ctx: &RequestContext, flashcard_id: i64) -> Result<(), LibraryError> {
    let deleted = ctx
        .db
        .delete_flashcard(ctx.user_id, flashcard_id)
        .await
        .map_err(|e| wrap(ctx, "delete_flashcard", e))?;
    if !deleted {
        return Err(LibraryError::NotFound(format!("flashcard {}", flashcard_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProgressState, SortField, SortOrder};
    use crate::memory::{FailPoint, InMemoryDatabase};
    use crate::ports::DatabaseService;
    use std::sync::Arc;
    use uuid::Uuid;

    fn card(front: &str) -> NewFlashcard {
        NewFlashcard {
            front: front.to_string(),
            back: "back".to_string(),
        }
    }

    fn ctx() -> (Arc<InMemoryDatabase>, RequestContext) {
        let db = Arc::new(InMemoryDatabase::new());
        let ctx = RequestContext::new(Uuid::new_v4(), db.clone());
        (db, ctx)
    }

    #[tokio::test]
    async fn list_reports_pagination() {
        let (db, ctx) = ctx();
        for i in 0..5 {
            db.create_set_with_flashcards(ctx.user_id, &format!("Set {}", i), &[])
                .await
                .unwrap();
        }
        let query = SetListQuery {
            page: 2,
            limit: 2,
            sort: SortField::Title,
            order: SortOrder::Asc,
            ..SetListQuery::default()
        };
        let page = list_sets(&ctx, &query).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].set.title, "Set 2");
        assert_eq!(
            page.pagination,
            Pagination {
                current_page: 2,
                total_pages: 3,
                total_items: 5,
                items_per_page: 2,
            }
        );
    }

    #[tokio::test]
    async fn list_failure_is_database_error() {
        let (db, ctx) = ctx();
        db.fail_next(FailPoint::ListSets);
        assert!(matches!(
            list_sets(&ctx, &SetListQuery::default()).await,
            Err(LibraryError::DatabaseError(_))
        ));
    }

    #[tokio::test]
    async fn detail_defaults_missing_progress() {
        let (db, ctx) = ctx();
        let set = db
            .create_set_with_flashcards(ctx.user_id, "Bio", &[card("a"), card("b")])
            .await
            .unwrap();
        let first = db.list_flashcards_with_progress(ctx.user_id, set.id).await.unwrap()[0]
            .flashcard
            .id;
        db.remove_progress(first);

        let detail = get_set_detail(&ctx, set.id).await.unwrap();
        assert_eq!(detail.summary.set.cards_count, 2);
        assert_eq!(detail.flashcards.len(), 2);
        let (flashcard, progress) = &detail.flashcards[0];
        assert_eq!(flashcard.id, first);
        assert_eq!(progress.state, ProgressState::New);
        assert_eq!(progress.reps, 0);
        assert_eq!(progress.lapses, 0);
    }

    #[tokio::test]
    async fn foreign_set_is_not_found() {
        let (db, ctx) = ctx();
        let set = db
            .create_set_with_flashcards(Uuid::new_v4(), "Theirs", &[card("a")])
            .await
            .unwrap();
        assert!(matches!(get_set_detail(&ctx, set.id).await, Err(LibraryError::NotFound(_))));
        assert!(matches!(
            update_set_title(&ctx, set.id, "Mine").await,
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(delete_set(&ctx, set.id).await, Err(LibraryError::NotFound(_))));
        assert!(matches!(
            create_flashcard(&ctx, set.id, &card("x")).await,
            Err(LibraryError::NotFound(_))
        ));
        assert_eq!(db.flashcard_count(), 1);
    }

    #[tokio::test]
    async fn flashcard_lifecycle() {
        let (db, ctx) = ctx();
        let set = db
            .create_set_with_flashcards(ctx.user_id, "Bio", &[])
            .await
            .unwrap();

        let created = create_flashcard(&ctx, set.id, &card("Q")).await.unwrap();
        assert_eq!(created.progress.flashcard_id, created.flashcard.id);
        assert_eq!(created.progress.state, ProgressState::New);
        assert_eq!(db.progress_count(), 1);

        let patch = FlashcardPatch {
            front: None,
            back: Some("new back".into()),
        };
        let updated = update_flashcard(&ctx, created.flashcard.id, &patch).await.unwrap();
        assert_eq!(updated.front, "Q");
        assert_eq!(updated.back, "new back");
        assert_eq!(db.progress_count(), 1);

        delete_flashcard(&ctx, created.flashcard.id).await.unwrap();
        assert_eq!(db.progress_count(), 0);
        assert!(matches!(
            delete_flashcard(&ctx, created.flashcard.id).await,
            Err(LibraryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_and_delete_set() {
        let (db, ctx) = ctx();
        let set = db
            .create_set_with_flashcards(ctx.user_id, "Old", &[card("a")])
            .await
            .unwrap();
        let renamed = update_set_title(&ctx, set.id, "New").await.unwrap();
        assert_eq!(renamed.title, "New");
        delete_set(&ctx, set.id).await.unwrap();
        assert_eq!(db.flashcard_count(), 0);
        assert!(matches!(get_set_detail(&ctx, set.id).await, Err(LibraryError::NotFound(_))));
    }
}

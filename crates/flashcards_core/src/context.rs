//! crates/flashcards_core/src/context.rs
//!
//! The request-scoped context handed to every service call.

use std::sync::Arc;

use uuid::Uuid;

use crate::ports::DatabaseService;

/// Who is asking, and the store to ask. Services read the owner id from here
/// rather than from any ambient state, so owner scoping is always explicit.
#[derive(Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub db: Arc<dyn DatabaseService>,
}

impl RequestContext {
    pub fn new(user_id: Uuid, db: Arc<dyn DatabaseService>) -> Self {
        Self { user_id, db }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

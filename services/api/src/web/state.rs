//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use flashcards_core::generation::GenerationService;
use flashcards_core::ports::{AuthProvider, DatabaseService};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub auth: Arc<dyn AuthProvider>,
    pub generation: GenerationService,
    pub config: Arc<Config>,
}

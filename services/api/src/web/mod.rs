pub mod auth;
pub mod dto;
pub mod flashcard_sets;
pub mod flashcards;
pub mod generations;
pub mod middleware;
pub mod rest;
pub mod state;

// Re-export what the binaries need to assemble the server.
pub use middleware::require_auth;
pub use rest::{build_router, ApiDoc};
pub use state::AppState;

pub mod auth;
pub mod db;
pub mod openrouter;

pub use auth::PasswordAuthAdapter;
pub use db::DbAdapter;
pub use openrouter::OpenRouterAdapter;

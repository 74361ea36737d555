pub mod ai;
pub mod candidates;
pub mod context;
pub mod domain;
pub mod fetch_guard;
pub mod finalize;
pub mod generation;
pub mod library;
pub mod memory;
pub mod ports;
pub mod review;
pub mod validation;

pub use context::RequestContext;
pub use domain::{AuthSession, AuthUser, UserCredentials};
pub use ports::{AuthProvider, ChatCompletionService, DatabaseService, PortError, PortResult};

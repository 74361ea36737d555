//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use flashcards_core::context::RequestContext;
use flashcards_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::HttpError;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// The session token from the `session` cookie, or else from an
/// `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        });
    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}

/// Middleware that resolves the caller from their session token.
///
/// If valid, inserts a `RequestContext` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    // --- 1. Extract the token ---
    let token = session_token(req.headers())
        .ok_or_else(|| HttpError::Unauthorized("Authentication required".to_string()))?;

    // --- 2. Resolve the user ---
    let user = state.auth.get_user(&token).await.map_err(|e| match e {
        PortError::Unauthorized | PortError::NotFound(_) => {
            debug!("Rejected request with an invalid or expired session");
            HttpError::Unauthorized("Invalid or expired session".to_string())
        }
        other => {
            error!("Failed to validate auth session: {}", other);
            HttpError::from(other)
        }
    })?;

    // --- 3. Bind the request context ---
    req.extensions_mut()
        .insert(RequestContext::new(user.user_id, state.db.clone()));

    // --- 4. Continue to the handler ---
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn cleared_cookie_is_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
    }
}

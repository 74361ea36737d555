//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, and logout.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use flashcards_core::domain::AuthSession;
use flashcards_core::ports::PortError;
use flashcards_core::validation::{validate_login, validate_registration};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::HttpError;
use crate::web::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::web::middleware::{session_token, SESSION_COOKIE};
use crate::web::state::AppState;

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

fn auth_reply(
    state: &AppState,
    status: StatusCode,
    session: AuthSession,
) -> impl IntoResponse {
    let max_age = chrono::Duration::days(state.config.auth_session_ttl_days).num_seconds();
    let cookie = session_cookie(&session.token, max_age);
    let body = AuthResponse {
        user_id: session.user.user_id,
        email: session.user.email,
        access_token: session.token,
    };
    (status, [(header::SET_COOKIE, cookie)], Json(body))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid email, short password or mismatched confirmation"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    // --- 1. Validate the form ---
    let Json(req) = payload?;
    let creds = validate_registration(&req.email, &req.password, &req.confirm)?;

    // --- 2. Create the account and open a session ---
    let session = state
        .auth
        .sign_up(&creds.email, &creds.password)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                HttpError::Conflict("An account with this email already exists".to_string())
            }
            other => HttpError::from(other),
        })?;
    info!(user_id = %session.user.user_id, "Registered new user");

    Ok(auth_reply(&state, StatusCode::CREATED, session))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed credentials"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(req) = payload?;
    let creds = validate_login(&req.email, &req.password)?;

    let session = state
        .auth
        .sign_in(&creds.email, &creds.password)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized | PortError::NotFound(_) => {
                HttpError::Unauthorized("Invalid email or password".to_string())
            }
            other => HttpError::from(other),
        })?;

    Ok(auth_reply(&state, StatusCode::OK, session))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 204, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    // --- 1. Extract the session token ---
    let token = session_token(&headers)
        .ok_or_else(|| HttpError::Unauthorized("No session found".to_string()))?;

    // --- 2. Invalidate it ---
    state.auth.sign_out(&token).await.map_err(|e| {
        warn!("Failed to sign out: {}", e);
        HttpError::from(e)
    })?;

    // --- 3. Clear cookie ---
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session_cookie("", 0))],
    ))
}

//! services/api/src/adapters/auth.rs
//!
//! Email/password authentication backed by the application's own store.
//! Passwords are hashed with Argon2; sessions are opaque random tokens with a
//! fixed lifetime.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use flashcards_core::domain::{AuthSession, AuthUser};
use flashcards_core::ports::{AuthProvider, DatabaseService, PortError, PortResult};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PasswordAuthAdapter {
    db: Arc<dyn DatabaseService>,
    session_ttl: Duration,
}

impl PasswordAuthAdapter {
    pub fn new(db: Arc<dyn DatabaseService>, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    async fn open_session(&self, user: AuthUser) -> PortResult<AuthSession> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.session_ttl;
        self.db
            .create_auth_session(&token, user.user_id, expires_at)
            .await?;
        Ok(AuthSession {
            token,
            user,
            expires_at,
        })
    }
}

fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            PortError::Unexpected("failed to hash password".to_string())
        })
}

fn verify_password(password: &str, hashed: &str) -> PortResult<bool> {
    let parsed = PasswordHash::new(hashed).map_err(|e| {
        error!("Failed to parse stored password hash: {:?}", e);
        PortError::Unexpected("stored password hash is malformed".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[async_trait]
impl AuthProvider for PasswordAuthAdapter {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        // --- 1. Hash the password ---
        let hashed = hash_password(password)?;

        // --- 2. Create the user (Conflict when the email is taken) ---
        let user = self.db.create_user_with_email(email, &hashed).await?;
        info!(user_id = %user.user_id, "User registered");

        // --- 3. Open a session ---
        self.open_session(user).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let creds = match self.db.get_user_by_email(email).await {
            Ok(creds) => creds,
            Err(PortError::NotFound(_)) => {
                warn!("Login attempt for unknown email");
                return Err(PortError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        if !verify_password(password, &creds.hashed_password)? {
            warn!(user_id = %creds.user_id, "Login attempt with wrong password");
            return Err(PortError::Unauthorized);
        }

        self.open_session(AuthUser {
            user_id: creds.user_id,
            email: creds.email,
        })
        .await
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        self.db.delete_auth_session(token).await
    }

    async fn get_user(&self, token: &str) -> PortResult<AuthUser> {
        self.db.validate_auth_session(token).await
    }
}

use crate::common::jwt::{JwtManager, TokenType};
use crate::error::{Error, Result};
use crate::models::{Session, User};
use crate::storage::{SessionStore, UserStore};
use chrono::Utc;
use ring::digest::{SHA256, digest};
use std::sync::Arc;
use uuid::Uuid;

/// Creates, verifies, refreshes, and revokes sessions, bridging token
/// identity (the JWT's `sid` claim) to the persisted session record.
/// Access tokens are never stored — only the refresh token's hash is, so
/// the store can resolve a presented refresh token back to its session
/// without holding a second bearer secret in the clear.
pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    jwt: Arc<JwtManager>,
}

/// The minted token pair plus the session they belong to.
pub struct IssuedSession {
    pub session: Session,
    pub access_token: String,
    pub refresh_token: String,
}

fn hash_token(token: &str) -> String {
    hex::encode(digest(&SHA256, token.as_bytes()))
}

impl SessionManager {
    pub fn new(sessions: Arc<dyn SessionStore>, users: Arc<dyn UserStore>, jwt: Arc<JwtManager>) -> Self {
        Self {
            sessions,
            users,
            jwt,
        }
    }

    pub async fn issue(&self, user: &User, ip: Option<String>, user_agent: Option<String>) -> Result<IssuedSession> {
        let session_id = Uuid::new_v4();
        let access_token = self.jwt.create_access_token(user.id, session_id)?;
        let refresh_token = self.jwt.create_refresh_token(user.id, session_id)?;
        let now = Utc::now();

        let session = Session {
            id: session_id,
            user_id: user.id,
            refresh_token_hash: hash_token(&refresh_token),
            ip,
            user_agent,
            created_at: now,
            last_seen_at: now,
            expires_at: now + self.jwt.access_ttl(),
            revoked_at: None,
        };

        let session = self.sessions.create(&session).await?;

        Ok(IssuedSession {
            session,
            access_token,
            refresh_token,
        })
    }

    /// Loads the session and user behind an access token. Updates
    /// `last_seen_at` best-effort: a failure to record activity must not
    /// fail an otherwise-valid request.
    pub async fn verify(&self, access_token: &str) -> Result<User> {
        let claims = self.jwt.validate_token_of_type(access_token, TokenType::Access)?;
        let session_id = claims.session_id()?;
        let user_id = claims.user_id()?;

        let session = self
            .sessions
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("session expired or inactive".to_string()))?;

        if !session.is_active(Utc::now()) {
            return Err(Error::Unauthorized("session expired or inactive".to_string()));
        }

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid session".to_string()))?;

        if !user.active {
            return Err(Error::Unauthorized("invalid session".to_string()));
        }

        if let Err(e) = self.sessions.touch_last_seen(session.id, Utc::now()).await {
            tracing::warn!(session_id = %session.id, error = %e, "failed to update session last_seen_at");
        }

        Ok(user)
    }

    /// Validates the refresh token, resolves the owning session by the
    /// token's hash (mandatory lookup capability on `SessionStore`), mints
    /// a fresh token pair, and rotates the stored hash.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession> {
        let claims = self.jwt.validate_token_of_type(refresh_token, TokenType::Refresh)?;
        let user_id = claims.user_id()?;

        let session = self
            .sessions
            .get_by_refresh_token_hash(&hash_token(refresh_token))
            .await?
            .ok_or_else(|| Error::Unauthorized("session not found".to_string()))?;

        if !session.is_active(Utc::now()) {
            return Err(Error::Unauthorized("session expired or inactive".to_string()));
        }

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid session".to_string()))?;

        if !user.active {
            return Err(Error::Unauthorized("invalid session".to_string()));
        }

        let new_access = self.jwt.create_access_token(user.id, session.id)?;
        let new_refresh = self.jwt.create_refresh_token(user.id, session.id)?;
        let now = Utc::now();
        let expires_at = now + self.jwt.access_ttl();

        self.sessions
            .update_tokens(session.id, &hash_token(&new_refresh), expires_at, now)
            .await?;

        Ok(IssuedSession {
            session: Session {
                expires_at,
                last_seen_at: now,
                refresh_token_hash: hash_token(&new_refresh),
                ..session
            },
            access_token: new_access,
            refresh_token: new_refresh,
        })
    }

    /// Deletes the session behind an access token. Strict semantics: a
    /// not-found session propagates as a failure rather than being treated
    /// as an already-logged-out no-op (see the logout-idempotency design
    /// note — sessions get the strict behavior, single-use tokens the
    /// lenient one).
    pub async fn revoke(&self, access_token: &str) -> Result<()> {
        let claims = self.jwt.validate_token_of_type(access_token, TokenType::Access)?;
        let session_id = claims.session_id()?;
        self.sessions.delete(session_id).await
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<()> {
        self.sessions.delete_all_for_user(user_id).await
    }
}

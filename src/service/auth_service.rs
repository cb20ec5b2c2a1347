use crate::common::config::TokenConfig;
use crate::error::{Error, Result};
use crate::models::{SingleUseTokenKind, User};
use crate::service::master_key::MasterKeyCoordinator;
use crate::service::oauth_bridge::{OAuthBridge, VerifiedOAuthIdentity};
use crate::service::session_manager::{IssuedSession, SessionManager};
use crate::service::two_factor::TwoFactorCore;
use crate::service::verification_tokens::VerificationTokenService;
use crate::service::{LockoutAccountant, WebAuthnCore};
use crate::storage::UserStore;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

/// Burned on every login attempt against an unknown username so the
/// response time for "no such user" and "wrong password" are
/// indistinguishable. Never a real user's hash.
static DUMMY_PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"dummy-password-for-timing-equalization", &salt)
        .expect("static dummy password always hashes")
        .to_string()
});

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(Error::from)
}

/// `changePassword`/`resetPassword` apply this beyond the length check the
/// HTTP layer already performs on input: at least one uppercase, one
/// lowercase, and one digit.
fn meets_reset_password_policy(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

fn strip_password_hash(mut user: User) -> User {
    user.password_hash = String::new();
    user
}

/// The token pair plus the (password-hash-stripped) user returned from any
/// session-issuing operation.
pub struct LoginResult {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<(User, IssuedSession)> for LoginResult {
    fn from((user, issued): (User, IssuedSession)) -> Self {
        Self {
            user: strip_password_hash(user),
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            expires_at: issued.session.expires_at,
        }
    }
}

pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Orchestrates the authentication core: the single contract the HTTP layer
/// calls into. Composes `LockoutAccountant`, `SessionManager`,
/// `MasterKeyCoordinator`, `OAuthBridge`, `VerificationTokenService`, and
/// (optionally, since they're only live with the right runtime
/// configuration) `TwoFactorCore`/`WebAuthnCore`.
pub struct AuthenticationService {
    users: Arc<dyn UserStore>,
    lockout: LockoutAccountant,
    sessions: SessionManager,
    master_keys: MasterKeyCoordinator,
    oauth: OAuthBridge,
    tokens: VerificationTokenService,
    two_factor: TwoFactorCore,
    webauthn: Option<WebAuthnCore>,
    token_config: TokenConfig,
}

impl AuthenticationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        lockout: LockoutAccountant,
        sessions: SessionManager,
        master_keys: MasterKeyCoordinator,
        oauth: OAuthBridge,
        tokens: VerificationTokenService,
        two_factor: TwoFactorCore,
        webauthn: Option<WebAuthnCore>,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            users,
            lockout,
            sessions,
            master_keys,
            oauth,
            tokens,
            two_factor,
            webauthn,
            token_config,
        }
    }

    pub fn two_factor(&self) -> &TwoFactorCore {
        &self.two_factor
    }

    pub fn webauthn(&self) -> Result<&WebAuthnCore> {
        self.webauthn
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("WebAuthn is not configured".to_string()))
    }

    /// Hashes the password, creates the user, and soft-creates a master
    /// key. A master-key failure never rolls back user creation.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let password_hash = hash_password(&input.password)?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4(),
            username: input.username,
            email: input.email,
            password_hash,
            role: input.role,
            active: true,
            last_login: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };

        let created = self.users.create(&user).await?;
        self.master_keys.create_for_new_user(&created, &input.password).await?;

        Ok(strip_password_hash(created))
    }

    /// Steps 1-9 of the login contract: lockout check, user lookup with
    /// timing-equalized password comparison, session issuance, best-effort
    /// bookkeeping, optional master-key unwrap.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: &str,
        user_agent: Option<String>,
    ) -> Result<LoginResult> {
        if self.lockout.is_locked(ip, username).await? {
            return Err(Error::LockedOut(self.lockout.retry_after_secs()));
        }

        let user = self.users.get_by_username(username).await?;
        let hash_to_check = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| DUMMY_PASSWORD_HASH.clone());
        let password_ok = verify_password(&hash_to_check, password);

        let Some(user) = user else {
            self.lockout.record(ip, username, false).await;
            return Err(Error::Unauthorized("invalid username or password".to_string()));
        };

        if !user.active {
            self.lockout.record(ip, username, false).await;
            return Err(Error::Disabled("account is disabled".to_string()));
        }

        if !password_ok {
            self.lockout.record(ip, username, false).await;
            return Err(Error::Unauthorized("invalid username or password".to_string()));
        }

        let issued = self.sessions.issue(&user, Some(ip.to_string()), user_agent).await?;

        if let Err(e) = self.users.update_last_login(user.id, Utc::now()).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to record last_login");
        }

        self.lockout.record(ip, username, true).await;

        if let Err(e) = self.master_keys.ensure_on_login(&user, password).await {
            tracing::error!(user_id = %user.id, error = %e, "master key present but failed to decrypt on login");
            return Err(e);
        }

        Ok((user, issued).into())
    }

    /// Resolves or provisions a local user from a verified external
    /// identity and proceeds straight to session issuance. Lockout does not
    /// apply; the login attempt is still recorded.
    pub async fn login_with_oauth(
        &self,
        identity: &VerifiedOAuthIdentity,
        ip: &str,
        user_agent: Option<String>,
    ) -> Result<LoginResult> {
        let user = self.oauth.resolve_or_provision(identity).await?;

        if !user.active {
            self.lockout.record(ip, &user.username, false).await;
            return Err(Error::Disabled("account is disabled".to_string()));
        }

        let issued = self.sessions.issue(&user, Some(ip.to_string()), user_agent).await?;

        if let Err(e) = self.users.update_last_login(user.id, Utc::now()).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to record last_login");
        }

        self.lockout.record(ip, &user.username, true).await;
        Ok((user, issued).into())
    }

    /// Issues a session for a user who has already completed a WebAuthn
    /// authentication ceremony.
    pub async fn login_with_webauthn(&self, user_id: Uuid, ip: &str, user_agent: Option<String>) -> Result<LoginResult> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid session".to_string()))?;

        if !user.active {
            self.lockout.record(ip, &user.username, false).await;
            return Err(Error::Disabled("account is disabled".to_string()));
        }

        let issued = self.sessions.issue(&user, Some(ip.to_string()), user_agent).await?;

        if let Err(e) = self.users.update_last_login(user.id, Utc::now()).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to record last_login");
        }

        self.lockout.record(ip, &user.username, true).await;
        Ok((user, issued).into())
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResult> {
        let issued = self.sessions.refresh(refresh_token).await?;
        let user = self
            .users
            .get_by_id(issued.session.user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid session".to_string()))?;
        Ok((user, issued).into())
    }

    pub async fn verify_access_token(&self, token: &str) -> Result<User> {
        Ok(strip_password_hash(self.sessions.verify(token).await?))
    }

    pub async fn logout(&self, access_token: &str) -> Result<()> {
        self.sessions.revoke(access_token).await
    }

    /// Verifies the old password, rotates the master key, updates the
    /// stored hash, and revokes every session for the user including the
    /// one used to make this call.
    pub async fn change_password(&self, user_id: Uuid, old_password: &str, new_password: &str) -> Result<()> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))?;

        if !verify_password(&user.password_hash, old_password) {
            return Err(Error::Unauthorized("invalid password".to_string()));
        }

        let new_hash = hash_password(new_password)?;
        self.master_keys
            .rotate_on_password_change(&user, old_password, new_password)
            .await?;
        self.users.update_password_hash(user_id, &new_hash).await?;
        self.sessions.revoke_all_for_user(user_id).await?;

        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    pub async fn request_verification_email(&self, user_id: Uuid) -> Result<String> {
        self.tokens.issue(user_id, SingleUseTokenKind::EmailVerification).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let user_id = self.tokens.redeem(token, SingleUseTokenKind::EmailVerification).await?;
        let mut metadata = HashMap::new();
        metadata.insert("email_verified".to_string(), "true".to_string());
        metadata.insert("email_verified_at".to_string(), Utc::now().to_rfc3339());
        self.users.update_metadata(user_id, metadata).await
    }

    /// Silent success on an unknown email — no user-enumeration side
    /// channel. Any other store error is fatal.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        match self.users.get_by_email(email).await? {
            Some(user) => Ok(Some(self.tokens.issue(user.id, SingleUseTokenKind::PasswordReset).await?)),
            None => Ok(None),
        }
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        if !meets_reset_password_policy(new_password) {
            return Err(Error::BadRequest(
                "password must be at least 8 characters and include an uppercase letter, a lowercase letter, and a digit"
                    .to_string(),
            ));
        }

        let user_id = self.tokens.redeem(token, SingleUseTokenKind::PasswordReset).await?;
        let new_hash = hash_password(new_password)?;
        self.users.update_password_hash(user_id, &new_hash).await?;
        self.sessions.revoke_all_for_user(user_id).await?;
        Ok(())
    }

    pub fn token_config(&self) -> &TokenConfig {
        &self.token_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{LockoutConfig, TotpConfig, WebAuthnConfig};
    use crate::common::encryption::EncryptionManager;
    use crate::common::jwt::JwtManager;
    use crate::storage::memory::{
        InMemoryLoginAttemptStore, InMemoryMasterKeyStore, InMemorySessionStore, InMemorySingleUseTokenStore,
        InMemoryTwoFactorStore, InMemoryUserStore,
    };

    fn encryption() -> EncryptionManager {
        unsafe {
            std::env::set_var("ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        }
        EncryptionManager::new()
    }

    fn service() -> (AuthenticationService, Arc<InMemoryUserStore>) {
        let users = Arc::new(InMemoryUserStore::default());
        let lockout = LockoutAccountant::new(Arc::new(InMemoryLoginAttemptStore::default()), LockoutConfig::default());
        let jwt = Arc::new(JwtManager::new("test_secret_key_minimum_32_chars".to_string(), 15, 168));
        let sessions = SessionManager::new(Arc::new(InMemorySessionStore::default()), users.clone(), jwt);
        let master_keys = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let oauth = OAuthBridge::new(users.clone());
        let tokens = VerificationTokenService::new(Arc::new(InMemorySingleUseTokenStore::default()), TokenConfig::default());
        let two_factor = TwoFactorCore::new(Arc::new(InMemoryTwoFactorStore::default()), encryption(), TotpConfig::default());
        let _ = WebAuthnConfig {
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            rp_name: "Ward".to_string(),
        };

        let service = AuthenticationService::new(
            users.clone(),
            lockout,
            sessions,
            master_keys,
            oauth,
            tokens,
            two_factor,
            None,
            TokenConfig::default(),
        );
        (service, users)
    }

    #[tokio::test]
    async fn test_create_user_then_login() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        let result = service
            .login("alice", "correct horse battery", "127.0.0.1", None)
            .await
            .unwrap();
        assert_eq!(result.user.username, "alice");
        assert!(result.user.password_hash.is_empty());
    }

    #[tokio::test]
    async fn test_login_wrong_password_fails() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        assert!(service.login("alice", "wrong", "127.0.0.1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_login_unknown_user_fails_same_as_wrong_password() {
        let (service, _users) = service();
        let err = service.login("nobody", "whatever", "127.0.0.1", None).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        for _ in 0..5 {
            let _ = service.login("alice", "wrong", "127.0.0.1", None).await;
        }

        let err = service
            .login("alice", "correct horse battery", "127.0.0.1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockedOut(_)));
    }

    #[tokio::test]
    async fn test_change_password_revokes_sessions() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        let result = service
            .login("alice", "correct horse battery", "127.0.0.1", None)
            .await
            .unwrap();

        service
            .change_password(result.user.id, "correct horse battery", "NewPassw0rd")
            .await
            .unwrap();

        assert!(service.verify_access_token(&result.access_token).await.is_err());
        assert!(service.login("alice", "NewPassw0rd", "127.0.0.1", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_request_password_reset_unknown_email_is_silent() {
        let (service, _users) = service();
        let result = service.request_password_reset("nobody@example.com").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_reset_password_rejects_weak_password() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        let token = service.request_password_reset("alice@example.com").await.unwrap().unwrap();
        assert!(service.reset_password(&token, "weakpassword").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_password_then_login_with_new_password() {
        let (service, _users) = service();
        service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        let token = service.request_password_reset("alice@example.com").await.unwrap().unwrap();
        service.reset_password(&token, "NewPassw0rd").await.unwrap();

        assert!(service.login("alice", "NewPassw0rd", "127.0.0.1", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_email_sets_metadata() {
        let (service, users) = service();
        let user = service
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "correct horse battery".into(),
                role: "user".into(),
            })
            .await
            .unwrap();

        let token = service.request_verification_email(user.id).await.unwrap();
        service.verify_email(&token).await.unwrap();

        let stored = users.get_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.email_verified());
    }
}

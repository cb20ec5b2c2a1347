/// Storage capability boundaries.
///
/// Every trait here is a narrow, async port the service layer depends on
/// through `Arc<dyn Trait>`. The core owns no knowledge of whether the
/// backing technology is Postgres, an OS keychain, or an in-memory map used
/// in tests — `postgres` and `keychain` provide the real implementations,
/// `memory` provides fakes wired up the same way in integration tests.
pub mod cache_ceremony;
pub mod keychain;
pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{
    EncryptedMasterKey, LoginAttempt, Session, SingleUseToken, SingleUseTokenKind, TwoFactorEnrollment,
    User, WebAuthnCredential,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user. Returns `Conflict` if the username or email is
    /// already taken.
    async fn create(&self, user: &User) -> Result<User>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn update_metadata(
        &self,
        user_id: Uuid,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<()>;
}

/// A session record linking an issued token pair to a user, ip, and
/// user-agent. Lookup by refresh-token hash is mandatory: the refresh
/// protocol has no other way to find the session a presented refresh token
/// belongs to.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>>;
    async fn get_by_refresh_token_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>>;
    async fn update_tokens(
        &self,
        id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Deletes a single session. Strict semantics: `NotFound` if the session
    /// does not exist — the caller (SessionManager::revoke) surfaces this as
    /// a failure rather than treating logout as unconditionally idempotent.
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Deletes every session for a user. Never errors on zero matches.
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<()>;
}

/// Append-only login attempt log. Must support a range query over
/// `(ip, username, since)` so lockout decisions can be computed without a
/// separate counter service.
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()>;
    async fn count_failed_since(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<u64>;
    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait MasterKeyStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<EncryptedMasterKey>>;
    async fn upsert(&self, key: &EncryptedMasterKey) -> Result<()>;
    async fn delete(&self, user_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>>;
    /// Inserts a new, disabled enrollment. Returns `Conflict` if one exists.
    async fn create(&self, enrollment: &TwoFactorEnrollment) -> Result<()>;
    async fn enable(&self, user_id: Uuid, enabled_at: DateTime<Utc>) -> Result<()>;
    /// Atomically removes `hashed_code` from the stored set if present.
    /// Returns whether a code was removed — the caller treats `false` as a
    /// mismatch. Two concurrent callers presenting the same code must not
    /// both see `true`.
    async fn consume_backup_code(&self, user_id: Uuid, hashed_code: &str) -> Result<bool>;
    async fn replace_backup_codes(&self, user_id: Uuid, hashed_codes: Vec<String>) -> Result<()>;
    async fn delete(&self, user_id: Uuid) -> Result<()>;
}

/// The WebAuthn credential set for a user. Named `CredentialSetStore` (not
/// `WebAuthnStore`) to match the capability-boundary naming the rest of the
/// storage layer uses — it stores a *set of credentials*, not ceremony
/// state, which lives in the cache instead.
#[async_trait]
pub trait CredentialSetStore: Send + Sync {
    async fn get_all(&self, user_id: Uuid) -> Result<Vec<WebAuthnCredential>>;
    /// Inserts or replaces the credential with the same `credential_id`.
    async fn upsert(&self, credential: &WebAuthnCredential) -> Result<()>;
    async fn update_counter(
        &self,
        credential_id: &str,
        counter: i64,
        last_used_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn delete(&self, user_id: Uuid, credential_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SingleUseTokenStore: Send + Sync {
    /// Rejects duplicates on the token value itself.
    async fn create(&self, token: &SingleUseToken) -> Result<()>;
    async fn get_by_token(&self, token: &str) -> Result<Option<SingleUseToken>>;
    /// Sets `used_at = now`. `NotFound` if the token doesn't exist.
    /// Overwriting an already-used token is permitted — callers invoke this
    /// at most once per successful ceremony, so it is idempotent in
    /// practice without the store needing to enforce it.
    async fn mark_used(&self, token: &str, kind: SingleUseTokenKind, at: DateTime<Utc>) -> Result<()>;
    async fn delete(&self, token: &str) -> Result<()>;
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64>;
}

/// The OS-keychain half of the hybrid password manager. Always the write
/// target of record during the transition to `CredentialStore`.
#[async_trait]
pub trait Keychain: Send + Sync {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>>;
    async fn set(&self, user_id: Uuid, connection_id: &str, secret: &str) -> Result<()>;
    /// Idempotent: a "not found" while deleting is treated as success.
    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()>;
}

/// The encrypted-datastore half of the hybrid password manager. Secrets are
/// stored pre-encrypted by the caller (`MasterKeyCoordinator`/
/// `PasswordManager` own the envelope); this store is just a keyed blob
/// table plus a migration-status flag.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>>;
    async fn set(&self, user_id: Uuid, connection_id: &str, ciphertext: &str) -> Result<()>;
    /// Idempotent: a "not found" while deleting is treated as success.
    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()>;
    async fn mark_migrated(&self, user_id: Uuid, connection_id: &str) -> Result<()>;
}

/// Short-lived storage for WebAuthn ceremony state between the begin and
/// finish calls of a registration or authentication round trip. Backed by
/// `CacheManager` in production; the in-memory fake drops entries on `take`
/// the same way a TTL eventually would.
#[async_trait]
pub trait CeremonyStore: Send + Sync {
    async fn put(&self, key: &str, state_json: &str) -> Result<()>;
    /// Reads and removes the entry in one step — a ceremony is consumed at
    /// most once, successfully or not.
    async fn take(&self, key: &str) -> Result<Option<String>>;
}

/// In-memory store implementations, used by service-layer unit tests so
/// they don't need a running Postgres instance. Each one guards its state
/// behind a `tokio::sync::RwLock` and mirrors the atomicity the Postgres
/// implementations provide (notably `consume_backup_code`, which must still
/// linearize two concurrent callers presenting the same code).
use crate::error::{Error, Result};
use crate::models::{
    EncryptedMasterKey, LoginAttempt, Session, SingleUseToken, SingleUseTokenKind,
    TwoFactorEnrollment, User, WebAuthnCredential,
};
use crate::storage::{
    CredentialSetStore, CredentialStore, Keychain, LoginAttemptStore, MasterKeyStore, SessionStore,
    SingleUseTokenStore, TwoFactorStore, UserStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryUserStore {
    by_id: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> Result<User> {
        let mut guard = self.by_id.write().await;
        let duplicate = guard
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if duplicate {
            return Err(Error::Conflict("username or email already in use".to_string()));
        }
        guard.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.by_id.read().await.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .by_id
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .by_id
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut guard = self.by_id.write().await;
        let user = guard
            .get_mut(&user_id)
            .ok_or_else(|| Error::NotFound("user".to_string()))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.by_id.write().await.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn update_metadata(&self, user_id: Uuid, metadata: HashMap<String, String>) -> Result<()> {
        let mut guard = self.by_id.write().await;
        let user = guard
            .get_mut(&user_id)
            .ok_or_else(|| Error::NotFound("user".to_string()))?;
        user.metadata = metadata;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &Session) -> Result<Session> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn get_by_refresh_token_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.refresh_token_hash == refresh_token_hash)
            .cloned())
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut guard = self.sessions.write().await;
        let session = guard
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound("session".to_string()))?;
        session.refresh_token_hash = refresh_token_hash.to_string();
        session.expires_at = expires_at;
        session.last_seen_at = last_seen_at;
        Ok(())
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.last_seen_at = at;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound("session".to_string()))
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<()> {
        self.sessions.write().await.retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLoginAttemptStore {
    attempts: RwLock<Vec<LoginAttempt>>,
}

#[async_trait]
impl LoginAttemptStore for InMemoryLoginAttemptStore {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn count_failed_since(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<u64> {
        let count = self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.ip == ip && a.username == username && !a.succeeded && a.occurred_at >= since)
            .count();
        Ok(count as u64)
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.attempts.write().await;
        let before_len = guard.len();
        guard.retain(|a| a.occurred_at >= before);
        Ok((before_len - guard.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryMasterKeyStore {
    keys: RwLock<HashMap<Uuid, EncryptedMasterKey>>,
}

#[async_trait]
impl MasterKeyStore for InMemoryMasterKeyStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<EncryptedMasterKey>> {
        Ok(self.keys.read().await.get(&user_id).cloned())
    }

    async fn upsert(&self, key: &EncryptedMasterKey) -> Result<()> {
        self.keys.write().await.insert(key.user_id, key.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        self.keys.write().await.remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTwoFactorStore {
    enrollments: RwLock<HashMap<Uuid, TwoFactorEnrollment>>,
}

#[async_trait]
impl TwoFactorStore for InMemoryTwoFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>> {
        Ok(self.enrollments.read().await.get(&user_id).cloned())
    }

    async fn create(&self, enrollment: &TwoFactorEnrollment) -> Result<()> {
        let mut guard = self.enrollments.write().await;
        if guard.contains_key(&enrollment.user_id) {
            return Err(Error::Conflict("two-factor already configured".to_string()));
        }
        guard.insert(enrollment.user_id, enrollment.clone());
        Ok(())
    }

    async fn enable(&self, user_id: Uuid, enabled_at: DateTime<Utc>) -> Result<()> {
        let mut guard = self.enrollments.write().await;
        let enrollment = guard
            .get_mut(&user_id)
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;
        enrollment.enabled = true;
        enrollment.enabled_at = Some(enabled_at);
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: Uuid, hashed_code: &str) -> Result<bool> {
        let mut guard = self.enrollments.write().await;
        let Some(enrollment) = guard.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = enrollment.backup_codes.len();
        enrollment.backup_codes.retain(|c| c != hashed_code);
        Ok(enrollment.backup_codes.len() != before)
    }

    async fn replace_backup_codes(&self, user_id: Uuid, hashed_codes: Vec<String>) -> Result<()> {
        let mut guard = self.enrollments.write().await;
        let enrollment = guard
            .get_mut(&user_id)
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;
        enrollment.backup_codes = hashed_codes;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        self.enrollments.write().await.remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialSetStore {
    credentials: RwLock<HashMap<String, WebAuthnCredential>>,
}

#[async_trait]
impl CredentialSetStore for InMemoryCredentialSetStore {
    async fn get_all(&self, user_id: Uuid) -> Result<Vec<WebAuthnCredential>> {
        Ok(self
            .credentials
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, credential: &WebAuthnCredential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(credential.credential_id.clone(), credential.clone());
        Ok(())
    }

    async fn update_counter(
        &self,
        credential_id: &str,
        counter: i64,
        last_used_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut guard = self.credentials.write().await;
        let credential = guard
            .get_mut(credential_id)
            .ok_or_else(|| Error::NotFound("webauthn credential".to_string()))?;
        credential.counter = counter;
        credential.last_used_at = Some(last_used_at);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, credential_id: &str) -> Result<()> {
        let mut guard = self.credentials.write().await;
        if guard.get(credential_id).map(|c| c.user_id) == Some(user_id) {
            guard.remove(credential_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySingleUseTokenStore {
    tokens: RwLock<HashMap<String, SingleUseToken>>,
}

#[async_trait]
impl SingleUseTokenStore for InMemorySingleUseTokenStore {
    async fn create(&self, token: &SingleUseToken) -> Result<()> {
        let mut guard = self.tokens.write().await;
        if guard.contains_key(&token.token) {
            return Err(Error::Conflict("token already exists".to_string()));
        }
        guard.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<SingleUseToken>> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn mark_used(&self, token: &str, kind: SingleUseTokenKind, at: DateTime<Utc>) -> Result<()> {
        let mut guard = self.tokens.write().await;
        let entry = guard
            .get_mut(token)
            .filter(|t| t.kind == kind)
            .ok_or_else(|| Error::NotFound("single-use token".to_string()))?;
        entry.used_at = Some(at);
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.tokens.write().await.remove(token);
        Ok(())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.tokens.write().await;
        let before_len = guard.len();
        guard.retain(|_, t| t.expires_at >= before);
        Ok((before_len - guard.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryKeychain {
    secrets: RwLock<HashMap<(Uuid, String), String>>,
}

#[async_trait]
impl Keychain for InMemoryKeychain {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .read()
            .await
            .get(&(user_id, connection_id.to_string()))
            .cloned())
    }

    async fn set(&self, user_id: Uuid, connection_id: &str, secret: &str) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert((user_id, connection_id.to_string()), secret.to_string());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        self.secrets
            .write()
            .await
            .remove(&(user_id, connection_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    secrets: RwLock<HashMap<(Uuid, String), (String, bool)>>,
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .read()
            .await
            .get(&(user_id, connection_id.to_string()))
            .map(|(ciphertext, _)| ciphertext.clone()))
    }

    async fn set(&self, user_id: Uuid, connection_id: &str, ciphertext: &str) -> Result<()> {
        let mut guard = self.secrets.write().await;
        let migrated = guard
            .get(&(user_id, connection_id.to_string()))
            .map(|(_, m)| *m)
            .unwrap_or(false);
        guard.insert(
            (user_id, connection_id.to_string()),
            (ciphertext.to_string(), migrated),
        );
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        self.secrets
            .write()
            .await
            .remove(&(user_id, connection_id.to_string()));
        Ok(())
    }

    async fn mark_migrated(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        if let Some(entry) = self
            .secrets
            .write()
            .await
            .get_mut(&(user_id, connection_id.to_string()))
        {
            entry.1 = true;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCeremonyStore {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl CeremonyStore for InMemoryCeremonyStore {
    async fn put(&self, key: &str, state_json: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), state_json.to_string());
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.write().await.remove(key))
    }
}

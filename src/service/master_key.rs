use crate::error::{Error, Result};
use crate::models::{EncryptedMasterKey, User};
use crate::storage::MasterKeyStore;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use std::sync::Arc;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MASTER_KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 210_000;

/// Owns a per-user symmetric master key, encrypted at rest with a key
/// derived from the user's password via PBKDF2-HMAC-SHA256. The decrypted
/// key never leaves this module except as a caller-held byte buffer.
pub struct MasterKeyCoordinator {
    store: Arc<dyn MasterKeyStore>,
    rng: SystemRandom,
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::new(1).unwrap());
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut key,
    );
    key
}

impl MasterKeyCoordinator {
    pub fn new(store: Arc<dyn MasterKeyStore>) -> Self {
        Self {
            store,
            rng: SystemRandom::new(),
        }
    }

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.rng
            .fill(&mut buf)
            .map_err(|_| Error::Internal("failed to generate random bytes".to_string()))?;
        Ok(buf)
    }

    fn wrap(&self, plaintext_key: &[u8], password: &str) -> Result<(String, String, String, i32)> {
        let salt = self.random_bytes(SALT_LEN)?;
        let nonce_bytes = self.random_bytes(NONCE_LEN)?;

        let derived = derive_key(password, &salt, PBKDF2_ITERATIONS);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext_key)
            .map_err(|e| Error::Internal(format!("master key encryption failed: {}", e)))?;

        Ok((
            general_purpose::STANDARD.encode(ciphertext),
            general_purpose::STANDARD.encode(nonce_bytes),
            general_purpose::STANDARD.encode(salt),
            PBKDF2_ITERATIONS as i32,
        ))
    }

    fn unwrap(&self, record: &EncryptedMasterKey, password: &str) -> Result<Vec<u8>> {
        let salt = general_purpose::STANDARD
            .decode(&record.salt)
            .map_err(|e| Error::Internal(format!("invalid salt encoding: {}", e)))?;
        let nonce_bytes = general_purpose::STANDARD
            .decode(&record.nonce)
            .map_err(|e| Error::Internal(format!("invalid nonce encoding: {}", e)))?;
        let ciphertext = general_purpose::STANDARD
            .decode(&record.ciphertext)
            .map_err(|e| Error::Internal(format!("invalid ciphertext encoding: {}", e)))?;

        let derived = derive_key(password, &salt, record.iterations as u32);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
        let nonce = Nonce::from_slice(&nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| Error::Internal("master key does not decrypt with the supplied password".to_string()))
    }

    /// Generates a fresh master key and stores it encrypted under the
    /// user's password. A storage failure here is logged but does not fail
    /// user creation — the user simply has no master key until a later
    /// rotation succeeds.
    pub async fn create_for_new_user(&self, user: &User, password: &str) -> Result<()> {
        let plaintext_key = self.random_bytes(MASTER_KEY_LEN)?;
        let (ciphertext, nonce, salt, iterations) = self.wrap(&plaintext_key, password)?;

        let now = Utc::now();
        let record = EncryptedMasterKey {
            user_id: user.id,
            ciphertext,
            nonce,
            salt,
            iterations,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.upsert(&record).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to store new master key, continuing without one");
        }

        Ok(())
    }

    /// Fetches and decrypts the user's master key after password
    /// verification. A missing key is a valid state (legacy user, or a
    /// user whose creation-time storage failed) and yields `None`. A
    /// present-but-undecryptable key is fatal — it means the stored key is
    /// unusable with the caller's password.
    pub async fn ensure_on_login(&self, user: &User, password: &str) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.store.get(user.id).await? else {
            return Ok(None);
        };

        self.unwrap(&record, password).map(Some)
    }

    /// Re-encrypts the master key under the new password. A missing key is
    /// a no-op; any other error is fatal to the password-change operation.
    pub async fn rotate_on_password_change(&self, user: &User, old_password: &str, new_password: &str) -> Result<()> {
        let Some(record) = self.store.get(user.id).await? else {
            return Ok(());
        };

        let plaintext_key = self.unwrap(&record, old_password)?;
        let (ciphertext, nonce, salt, iterations) = self.wrap(&plaintext_key, new_password)?;

        let updated = EncryptedMasterKey {
            user_id: user.id,
            ciphertext,
            nonce,
            salt,
            iterations,
            created_at: record.created_at,
            updated_at: Utc::now(),
        };

        self.store.upsert(&updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryMasterKeyStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            role: "user".into(),
            active: true,
            last_login: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_then_ensure_on_login() {
        let coordinator = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let user = test_user();

        coordinator.create_for_new_user(&user, "oldpass").await.unwrap();
        let key = coordinator.ensure_on_login(&user, "oldpass").await.unwrap();
        assert!(key.is_some());
    }

    #[tokio::test]
    async fn test_ensure_on_login_missing_key_is_none() {
        let coordinator = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let user = test_user();
        let key = coordinator.ensure_on_login(&user, "whatever").await.unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_fails_to_decrypt() {
        let coordinator = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let user = test_user();
        coordinator.create_for_new_user(&user, "oldpass").await.unwrap();
        assert!(coordinator.ensure_on_login(&user, "wrongpass").await.is_err());
    }

    #[tokio::test]
    async fn test_rotate_on_password_change() {
        let coordinator = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let user = test_user();
        coordinator.create_for_new_user(&user, "oldpass").await.unwrap();

        let original_key = coordinator.ensure_on_login(&user, "oldpass").await.unwrap().unwrap();

        coordinator
            .rotate_on_password_change(&user, "oldpass", "newpass")
            .await
            .unwrap();

        assert!(coordinator.ensure_on_login(&user, "oldpass").await.is_err());
        let rotated_key = coordinator.ensure_on_login(&user, "newpass").await.unwrap().unwrap();
        assert_eq!(original_key, rotated_key);
    }

    #[tokio::test]
    async fn test_rotate_missing_key_is_noop() {
        let coordinator = MasterKeyCoordinator::new(Arc::new(InMemoryMasterKeyStore::default()));
        let user = test_user();
        coordinator
            .rotate_on_password_change(&user, "oldpass", "newpass")
            .await
            .unwrap();
    }
}

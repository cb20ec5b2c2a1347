use crate::common::encryption::EncryptionManager;
use crate::error::{Error, Result};
use crate::storage::{CredentialStore, Keychain};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Dual-read/dual-write façade over an OS keychain and an encrypted table,
/// letting callers migrate off the keychain without downtime. A single
/// `RwLock` guards the pair-of-stores: reads take the shared side, writes
/// the exclusive side. The background migration spawned from a read does
/// NOT go through this lock — it talks to the underlying stores directly,
/// matching the concurrency model's requirement that migration never block
/// a concurrent caller.
///
/// The encrypted store is keyed per user: every encrypt/decrypt against it
/// takes the caller's decrypted master key (from `MasterKeyCoordinator`)
/// as explicit key material rather than the process-wide `ENCRYPTION_KEY`,
/// so one user's ciphertext is never decryptable with another user's key.
pub struct PasswordManager {
    lock: RwLock<()>,
    keychain: Arc<dyn Keychain>,
    encrypted: Arc<dyn CredentialStore>,
}

impl PasswordManager {
    pub fn new(keychain: Arc<dyn Keychain>, encrypted: Arc<dyn CredentialStore>) -> Self {
        Self {
            lock: RwLock::new(()),
            keychain,
            encrypted,
        }
    }

    /// Reads the secret for (user, connection). When `master_key` is
    /// present, the encrypted store is tried first, decrypted with that
    /// key; a decryption failure or miss falls through to the keychain
    /// rather than failing the caller — decryption errors during key
    /// rotation must not look like data loss. A keychain hit with a master
    /// key present schedules an opportunistic background migration.
    pub async fn get(&self, user_id: Uuid, connection_id: &str, master_key: Option<&[u8]>) -> Result<String> {
        let _guard = self.lock.read().await;

        if let Some(key) = master_key {
            if let Some(ciphertext) = self.encrypted.get(user_id, connection_id).await? {
                if let Ok(secret) = EncryptionManager::decrypt_with_key(key, &ciphertext) {
                    return Ok(secret);
                }
                tracing::warn!(%user_id, connection_id, "encrypted credential failed to decrypt, falling back to keychain");
            }
        }

        let secret = self
            .keychain
            .get(user_id, connection_id)
            .await?
            .ok_or_else(|| Error::NotFound("credential".to_string()))?;

        if let Some(key) = master_key {
            self.spawn_migration(user_id, connection_id.to_string(), secret.clone(), key.to_vec());
        }

        Ok(secret)
    }

    /// Always writes the keychain (the backup during the transition) and,
    /// when a master key is present, also the encrypted store, encrypted
    /// under that key. Succeeds if either write succeeds; the keychain's
    /// error is the one surfaced on total failure, since it's the primary
    /// write path.
    pub async fn set(&self, user_id: Uuid, connection_id: &str, secret: &str, master_key: Option<&[u8]>) -> Result<()> {
        let _guard = self.lock.write().await;

        let keychain_result = self.keychain.set(user_id, connection_id, secret).await;

        if let Some(key) = master_key {
            match EncryptionManager::encrypt_with_key(key, secret) {
                Ok(ciphertext) => {
                    if self.encrypted.set(user_id, connection_id, &ciphertext).await.is_ok() {
                        let _ = self.encrypted.mark_migrated(user_id, connection_id).await;
                    }
                }
                Err(e) => tracing::error!(%user_id, connection_id, error = %e, "failed to encrypt credential for dual-write"),
            }
        }

        match keychain_result {
            Ok(()) => Ok(()),
            Err(keychain_err) => {
                if master_key.is_some() && self.encrypted.get(user_id, connection_id).await.ok().flatten().is_some() {
                    Ok(())
                } else {
                    Err(keychain_err)
                }
            }
        }
    }

    /// Deletes from both stores. A "not found" in either is treated as
    /// success and both errors are logged; repeated deletes are idempotent.
    pub async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        let _guard = self.lock.write().await;

        if let Err(e) = self.keychain.delete(user_id, connection_id).await {
            tracing::warn!(%user_id, connection_id, error = %e, "keychain delete failed");
        }
        if let Err(e) = self.encrypted.delete(user_id, connection_id).await {
            tracing::warn!(%user_id, connection_id, error = %e, "encrypted store delete failed");
        }

        Ok(())
    }

    /// Re-encrypts the keychain's copy into the encrypted store on a
    /// detached task, outside the façade lock. Re-checks the encrypted
    /// store first so a concurrent legitimate write isn't clobbered.
    fn spawn_migration(&self, user_id: Uuid, connection_id: String, secret: String, master_key: Vec<u8>) {
        let encrypted = self.encrypted.clone();

        tokio::spawn(async move {
            match encrypted.get(user_id, &connection_id).await {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%user_id, connection_id, error = %e, "migration pre-check failed");
                    return;
                }
            }

            let ciphertext = match EncryptionManager::encrypt_with_key(&master_key, &secret) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(%user_id, connection_id, error = %e, "migration encryption failed");
                    return;
                }
            };

            if let Err(e) = encrypted.set(user_id, &connection_id, &ciphertext).await {
                tracing::warn!(%user_id, connection_id, error = %e, "migration write failed");
                return;
            }

            if let Err(e) = encrypted.mark_migrated(user_id, &connection_id).await {
                tracing::warn!(%user_id, connection_id, error = %e, "failed to flag connection as migrated");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryCredentialStore, InMemoryKeychain};

    const TEST_MASTER_KEY: [u8; 32] = [3u8; 32];
    const OTHER_MASTER_KEY: [u8; 32] = [9u8; 32];

    fn manager() -> PasswordManager {
        PasswordManager::new(
            Arc::new(InMemoryKeychain::default()),
            Arc::new(InMemoryCredentialStore::default()),
        )
    }

    #[tokio::test]
    async fn test_set_then_get_without_master_key() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.set(user_id, "conn-1", "s3cret", None).await.unwrap();
        let secret = manager.get(user_id, "conn-1", None).await.unwrap();
        assert_eq!(secret, "s3cret");
    }

    #[tokio::test]
    async fn test_set_then_get_with_master_key_prefers_encrypted_store() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager
            .set(user_id, "conn-1", "s3cret", Some(&TEST_MASTER_KEY))
            .await
            .unwrap();
        let secret = manager
            .get(user_id, "conn-1", Some(&TEST_MASTER_KEY))
            .await
            .unwrap();
        assert_eq!(secret, "s3cret");
    }

    #[tokio::test]
    async fn test_wrong_master_key_falls_back_to_keychain() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager
            .set(user_id, "conn-1", "s3cret", Some(&TEST_MASTER_KEY))
            .await
            .unwrap();

        // A different user's master key can't decrypt this ciphertext, so
        // the read falls through to the keychain's copy instead of failing.
        let secret = manager
            .get(user_id, "conn-1", Some(&OTHER_MASTER_KEY))
            .await
            .unwrap();
        assert_eq!(secret, "s3cret");
    }

    #[tokio::test]
    async fn test_keychain_hit_triggers_background_migration() {
        let manager = manager();
        let user_id = Uuid::new_v4();

        // keychain-only write (no master key yet)
        manager.set(user_id, "conn-1", "s3cret", None).await.unwrap();

        // now a read with a master key should migrate opportunistically
        let secret = manager
            .get(user_id, "conn-1", Some(&TEST_MASTER_KEY))
            .await
            .unwrap();
        assert_eq!(secret, "s3cret");

        // give the spawned task a chance to run
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let migrated_secret = manager
            .get(user_id, "conn-1", Some(&TEST_MASTER_KEY))
            .await
            .unwrap();
        assert_eq!(migrated_secret, "s3cret");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        manager.set(user_id, "conn-1", "s3cret", None).await.unwrap();
        manager.delete(user_id, "conn-1").await.unwrap();
        manager.delete(user_id, "conn-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let manager = manager();
        let result = manager.get(Uuid::new_v4(), "conn-1", None).await;
        assert!(result.is_err());
    }
}

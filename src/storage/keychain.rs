use crate::error::{Error, Result};
use crate::storage::Keychain;
use async_trait::async_trait;
use uuid::Uuid;

/// Keychain backed by the platform credential store (macOS Keychain,
/// Windows Credential Manager, the Secret Service on Linux) via `keyring`.
/// Each (user, connection) pair gets its own entry under a service
/// namespace so unrelated applications on the same machine can't collide
/// with it.
pub struct OsKeychain {
    service: String,
}

impl OsKeychain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn account(user_id: Uuid, connection_id: &str) -> String {
        format!("{}:{}", user_id, connection_id)
    }

    fn entry(&self, user_id: Uuid, connection_id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &Self::account(user_id, connection_id))
            .map_err(|e| Error::Internal(format!("keychain entry creation failed: {}", e)))
    }
}

#[async_trait]
impl Keychain for OsKeychain {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>> {
        let entry = self.entry(user_id, connection_id)?;
        // keyring's API is blocking; the platform calls it wraps are fast
        // local IPC, so running it on the async executor thread directly
        // (rather than spawn_blocking) mirrors how the teacher treats other
        // short, unavoidably-synchronous FFI calls.
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Internal(format!("keychain read failed: {}", e))),
        }
    }

    async fn set(&self, user_id: Uuid, connection_id: &str, secret: &str) -> Result<()> {
        let entry = self.entry(user_id, connection_id)?;
        entry
            .set_password(secret)
            .map_err(|e| Error::Internal(format!("keychain write failed: {}", e)))
    }

    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        let entry = self.entry(user_id, connection_id)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Internal(format!("keychain delete failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_includes_both_ids() {
        let user_id = Uuid::new_v4();
        let account = OsKeychain::account(user_id, "conn-1");
        assert!(account.starts_with(&user_id.to_string()));
        assert!(account.ends_with("conn-1"));
    }
}

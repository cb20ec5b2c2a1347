use crate::common::config::WebAuthnConfig;
use crate::error::{Error, Result};
use crate::models::WebAuthnCredential;
use crate::storage::{CeremonyStore, CredentialSetStore, UserStore};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;
use webauthn_rs::Webauthn;
use webauthn_rs::prelude::*;

fn ceremony_registration_key(user_id: Uuid) -> String {
    crate::common::cache::keys::webauthn_registration(user_id)
}

fn ceremony_authentication_key(username: &str) -> String {
    crate::common::cache::keys::webauthn_authentication(username)
}

/// Passkey registration and authentication ceremonies. The challenge/state
/// pair produced by `begin_*` lives in the cache between round trips; the
/// credential set itself — what a user can actually authenticate with — is
/// the store's concern.
pub struct WebAuthnCore {
    webauthn: Webauthn,
    credentials: Arc<dyn CredentialSetStore>,
    ceremonies: Arc<dyn CeremonyStore>,
    users: Arc<dyn UserStore>,
}

impl WebAuthnCore {
    pub fn new(
        config: &WebAuthnConfig,
        credentials: Arc<dyn CredentialSetStore>,
        ceremonies: Arc<dyn CeremonyStore>,
        users: Arc<dyn UserStore>,
    ) -> Result<Self> {
        let rp_origin = Url::parse(&config.rp_origin)
            .map_err(|e| Error::Internal(format!("invalid WebAuthn rp_origin: {}", e)))?;

        let webauthn = WebauthnBuilder::new(&config.rp_id, &rp_origin)
            .map_err(|e| Error::Internal(format!("invalid WebAuthn configuration: {}", e)))?
            .rp_name(&config.rp_name)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build WebAuthn instance: {}", e)))?;

        Ok(Self {
            webauthn,
            credentials,
            ceremonies,
            users,
        })
    }

    async fn stored_passkeys(&self, user_id: Uuid) -> Result<Vec<Passkey>> {
        let records = self.credentials.get_all(user_id).await?;
        records
            .iter()
            .map(|record| {
                serde_json::from_value(record.passkey_json.clone())
                    .map_err(|e| Error::Internal(format!("stored passkey failed to deserialize: {}", e)))
            })
            .collect()
    }

    /// Starts registration. Existing credentials are excluded so the same
    /// authenticator can't be enrolled twice.
    pub async fn begin_registration(&self, user_id: Uuid, username: &str, display_name: &str) -> Result<String> {
        let existing = self.stored_passkeys(user_id).await?;
        let exclude = if existing.is_empty() {
            None
        } else {
            Some(existing.iter().map(|p| p.cred_id().clone()).collect())
        };

        let (ccr, state) = self
            .webauthn
            .start_passkey_registration(user_id, username, display_name, exclude)
            .map_err(|e| Error::Internal(format!("failed to start registration: {}", e)))?;

        let state_json = serde_json::to_string(&state)
            .map_err(|e| Error::Internal(format!("failed to serialize registration state: {}", e)))?;
        self.ceremonies.put(&ceremony_registration_key(user_id), &state_json).await?;

        serde_json::to_string(&ccr).map_err(|e| Error::Internal(format!("failed to serialize challenge: {}", e)))
    }

    /// Completes registration and persists the new credential.
    pub async fn finish_registration(&self, user_id: Uuid, response_json: &str) -> Result<()> {
        let state_json = self
            .ceremonies
            .take(&ceremony_registration_key(user_id))
            .await?
            .ok_or_else(|| Error::BadRequest("no registration in progress".to_string()))?;

        let state: PasskeyRegistration = serde_json::from_str(&state_json)
            .map_err(|e| Error::Internal(format!("corrupt registration state: {}", e)))?;
        let response: RegisterPublicKeyCredential = serde_json::from_str(response_json)
            .map_err(|e| Error::BadRequest(format!("invalid registration response: {}", e)))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&response, &state)
            .map_err(|e| Error::Unauthorized(format!("registration verification failed: {}", e)))?;

        let credential_id = general_purpose::URL_SAFE_NO_PAD.encode(passkey.cred_id());
        let passkey_json = serde_json::to_value(&passkey)
            .map_err(|e| Error::Internal(format!("failed to serialize passkey: {}", e)))?;

        self.credentials
            .upsert(&WebAuthnCredential {
                credential_id,
                user_id,
                passkey_json,
                counter: passkey.counter() as i64,
                created_at: Utc::now(),
                last_used_at: None,
            })
            .await
    }

    /// Starts authentication for a username. The user must exist and have
    /// at least one registered credential.
    pub async fn begin_authentication(&self, username: &str) -> Result<String> {
        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))?;

        let passkeys = self.stored_passkeys(user.id).await?;
        if passkeys.is_empty() {
            return Err(Error::NotFound("no registered credentials".to_string()));
        }

        let (rcr, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| Error::Internal(format!("failed to start authentication: {}", e)))?;

        let state_json = serde_json::to_string(&state)
            .map_err(|e| Error::Internal(format!("failed to serialize authentication state: {}", e)))?;
        self.ceremonies
            .put(&ceremony_authentication_key(username), &state_json)
            .await?;

        serde_json::to_string(&rcr).map_err(|e| Error::Internal(format!("failed to serialize challenge: {}", e)))
    }

    /// Looks up the username for a user id and starts authentication. The
    /// external interface identifies the subject by user id; ceremony state
    /// is still keyed by username internally since that's what a
    /// usernameless begin call would have to key on too.
    pub async fn begin_authentication_for_user(&self, user_id: Uuid) -> Result<String> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))?;
        self.begin_authentication(&user.username).await
    }

    /// Looks up the username for a user id and finishes authentication,
    /// returning the same user id back on success.
    pub async fn finish_authentication_for_user(&self, user_id: Uuid, response_json: &str) -> Result<Uuid> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))?;
        self.finish_authentication(&user.username, response_json).await
    }

    /// Completes authentication, updates the credential's signature
    /// counter, and returns the authenticated user id.
    pub async fn finish_authentication(&self, username: &str, response_json: &str) -> Result<Uuid> {
        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))?;

        let state_json = self
            .ceremonies
            .take(&ceremony_authentication_key(username))
            .await?
            .ok_or_else(|| Error::BadRequest("no authentication in progress".to_string()))?;

        let state: PasskeyAuthentication = serde_json::from_str(&state_json)
            .map_err(|e| Error::Internal(format!("corrupt authentication state: {}", e)))?;
        let response: PublicKeyCredential = serde_json::from_str(response_json)
            .map_err(|e| Error::BadRequest(format!("invalid authentication response: {}", e)))?;

        let auth_result = self
            .webauthn
            .finish_passkey_authentication(&response, &state)
            .map_err(|e| Error::Unauthorized(format!("authentication verification failed: {}", e)))?;

        let credential_id = general_purpose::URL_SAFE_NO_PAD.encode(auth_result.cred_id());
        self.credentials
            .update_counter(&credential_id, auth_result.counter() as i64, Utc::now())
            .await?;

        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryCeremonyStore, InMemoryCredentialSetStore, InMemoryUserStore};

    fn config() -> WebAuthnConfig {
        WebAuthnConfig {
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            rp_name: "Ward".to_string(),
        }
    }

    fn core() -> (WebAuthnCore, Arc<InMemoryUserStore>) {
        let users = Arc::new(InMemoryUserStore::default());
        let core = WebAuthnCore::new(
            &config(),
            Arc::new(InMemoryCredentialSetStore::default()),
            Arc::new(InMemoryCeremonyStore::default()),
            users.clone(),
        )
        .unwrap();
        (core, users)
    }

    #[tokio::test]
    async fn test_begin_registration_produces_challenge_json() {
        let (core, _users) = core();
        let ccr_json = core
            .begin_registration(Uuid::new_v4(), "alice", "Alice")
            .await
            .unwrap();
        assert!(ccr_json.contains("publicKey") || ccr_json.contains("rp"));
    }

    #[tokio::test]
    async fn test_begin_authentication_requires_existing_user() {
        let (core, _users) = core();
        assert!(core.begin_authentication("nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_begin_authentication_requires_registered_credential() {
        use std::collections::HashMap;
        let (core, users) = core();
        let user_id = Uuid::new_v4();
        users
            .create(&crate::models::User {
                id: user_id,
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "hash".into(),
                role: "user".into(),
                active: true,
                last_login: None,
                metadata: HashMap::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(core.begin_authentication("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_finish_registration_without_begin_fails() {
        let (core, _users) = core();
        assert!(core.finish_registration(Uuid::new_v4(), "{}").await.is_err());
    }
}

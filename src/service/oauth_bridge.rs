use crate::error::Result;
use crate::models::User;
use crate::storage::UserStore;
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A verified external identity handed to the core by the HTTP layer after
/// it completes the provider's authorization-code exchange with `oauth2`.
/// Not persisted — the provider vouches for these fields, the core never
/// stores the provider or external id.
#[derive(Debug, Clone)]
pub struct VerifiedOAuthIdentity {
    pub provider: String,
    pub external_id: String,
    pub login: String,
    pub email: String,
    pub display_name: String,
}

/// Resolves a verified OAuth identity to a local user, provisioning one on
/// first sign-in. Grounded on the "resolve by email, else provision"
/// strategy: there is no persisted identity-linking table, so a user who
/// signs in with two different providers sharing an email is resolved to
/// the same account both times.
pub struct OAuthBridge {
    users: Arc<dyn UserStore>,
    rng: SystemRandom,
}

impl OAuthBridge {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            rng: SystemRandom::new(),
        }
    }

    /// A password hash no real password can ever produce via Argon2's PHC
    /// format validator — locks out the password login path for
    /// OAuth-provisioned accounts until they explicitly set a password.
    fn unusable_password_hash(&self) -> String {
        let mut bytes = [0u8; 16];
        let _ = self.rng.fill(&mut bytes);
        format!("oauth-provisioned:{}", hex::encode(bytes))
    }

    fn unique_username_from(login: &str) -> String {
        let slug: String = login
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if slug.is_empty() {
            format!("user-{}", Uuid::new_v4())
        } else {
            slug
        }
    }

    /// Resolves the identity to a local user, provisioning one if no user
    /// with this email exists yet. Skips password verification entirely —
    /// the caller (AuthenticationService::loginWithOAuth) proceeds straight
    /// to session issuance.
    pub async fn resolve_or_provision(&self, identity: &VerifiedOAuthIdentity) -> Result<User> {
        let normalized_email = identity.email.to_lowercase();

        if let Some(user) = self.users.get_by_email(&normalized_email).await? {
            return Ok(user);
        }

        let mut metadata = HashMap::new();
        metadata.insert("email_verified".to_string(), "true".to_string());
        metadata.insert("oauth_provider".to_string(), identity.provider.clone());

        let base_username = Self::unique_username_from(&identity.login);
        let now = Utc::now();
        let mut candidate = User {
            id: Uuid::new_v4(),
            username: base_username.clone(),
            email: normalized_email,
            password_hash: self.unusable_password_hash(),
            role: "user".to_string(),
            active: true,
            last_login: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        match self.users.create(&candidate).await {
            Ok(user) => Ok(user),
            Err(crate::error::Error::Conflict(_)) => {
                candidate.id = Uuid::new_v4();
                candidate.username = format!("{}-{}", base_username, &candidate.id.simple().to_string()[..8]);
                self.users.create(&candidate).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryUserStore;

    fn identity(email: &str) -> VerifiedOAuthIdentity {
        VerifiedOAuthIdentity {
            provider: "google".to_string(),
            external_id: "ext-1".to_string(),
            login: "alice".to_string(),
            email: email.to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_provisions_new_user_on_first_login() {
        let bridge = OAuthBridge::new(Arc::new(InMemoryUserStore::default()));
        let user = bridge.resolve_or_provision(&identity("alice@example.com")).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.email_verified());
    }

    #[tokio::test]
    async fn test_resolves_existing_user_by_email() {
        let bridge = OAuthBridge::new(Arc::new(InMemoryUserStore::default()));
        let first = bridge.resolve_or_provision(&identity("alice@example.com")).await.unwrap();
        let second = bridge.resolve_or_provision(&identity("alice@example.com")).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_username_collision_gets_suffixed() {
        let users = Arc::new(InMemoryUserStore::default());
        let bridge = OAuthBridge::new(users.clone());

        let existing = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "someone-else@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: "user".to_string(),
            active: true,
            last_login: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        users.create(&existing).await.unwrap();

        let provisioned = bridge.resolve_or_provision(&identity("alice@example.com")).await.unwrap();
        assert_ne!(provisioned.username, "alice");
    }
}

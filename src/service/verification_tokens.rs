use crate::common::config::TokenConfig;
use crate::error::{Error, Result};
use crate::models::{SingleUseToken, SingleUseTokenKind};
use crate::storage::SingleUseTokenStore;
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

/// Issues and redeems single-use tokens for email verification and password
/// reset. Deletion here is lenient — unlike sessions, a missing or
/// already-used token on delete is not an error, since callers may race a
/// cleanup job or a second click of the same link.
pub struct VerificationTokenService {
    store: Arc<dyn SingleUseTokenStore>,
    config: TokenConfig,
    rng: SystemRandom,
}

impl VerificationTokenService {
    pub fn new(store: Arc<dyn SingleUseTokenStore>, config: TokenConfig) -> Self {
        Self {
            store,
            config,
            rng: SystemRandom::new(),
        }
    }

    fn generate_token(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| Error::Internal("failed to generate token".to_string()))?;
        Ok(hex::encode(bytes))
    }

    fn ttl_for(&self, kind: SingleUseTokenKind) -> Duration {
        match kind {
            SingleUseTokenKind::EmailVerification => Duration::hours(self.config.email_verification_ttl_hours),
            SingleUseTokenKind::PasswordReset => Duration::hours(self.config.password_reset_ttl_hours),
        }
    }

    /// Generates and persists a new token. The raw value is returned once —
    /// only the caller (the delivery mechanism, e.g. outbound email) ever
    /// sees it in plaintext.
    pub async fn issue(&self, user_id: Uuid, kind: SingleUseTokenKind) -> Result<String> {
        let token = self.generate_token()?;
        let now = Utc::now();

        self.store
            .create(&SingleUseToken {
                id: Uuid::new_v4(),
                user_id,
                token: token.clone(),
                kind,
                expires_at: now + self.ttl_for(kind),
                used_at: None,
                created_at: now,
            })
            .await?;

        Ok(token)
    }

    /// Validates and consumes a token of the expected kind. Returns the
    /// owning user id. Rejects tokens that are the wrong kind, expired, or
    /// already used, without distinguishing which in the error — callers
    /// don't get to probe which reason a token failed for.
    pub async fn redeem(&self, token: &str, expected_kind: SingleUseTokenKind) -> Result<Uuid> {
        let record = self
            .store
            .get_by_token(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid or expired token".to_string()))?;

        if record.kind != expected_kind || !record.is_valid(Utc::now()) {
            return Err(Error::Unauthorized("invalid or expired token".to_string()));
        }

        self.store.mark_used(token, expected_kind, Utc::now()).await?;
        Ok(record.user_id)
    }

    /// Best-effort cleanup: deletes a token without failing the caller if
    /// it's already gone.
    pub async fn discard(&self, token: &str) {
        if let Err(e) = self.store.delete(token).await {
            tracing::warn!(error = %e, "failed to discard single-use token");
        }
    }

    pub async fn cleanup_expired(&self, before: chrono::DateTime<Utc>) -> Result<u64> {
        self.store.cleanup_expired(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemorySingleUseTokenStore;

    fn service() -> VerificationTokenService {
        VerificationTokenService::new(Arc::new(InMemorySingleUseTokenStore::default()), TokenConfig::default())
    }

    #[tokio::test]
    async fn test_issue_then_redeem() {
        let service = service();
        let user_id = Uuid::new_v4();
        let token = service.issue(user_id, SingleUseTokenKind::EmailVerification).await.unwrap();

        let redeemed = service
            .redeem(&token, SingleUseTokenKind::EmailVerification)
            .await
            .unwrap();
        assert_eq!(redeemed, user_id);
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        let service = service();
        let user_id = Uuid::new_v4();
        let token = service.issue(user_id, SingleUseTokenKind::PasswordReset).await.unwrap();

        service.redeem(&token, SingleUseTokenKind::PasswordReset).await.unwrap();
        assert!(service.redeem(&token, SingleUseTokenKind::PasswordReset).await.is_err());
    }

    #[tokio::test]
    async fn test_redeem_wrong_kind_fails() {
        let service = service();
        let user_id = Uuid::new_v4();
        let token = service.issue(user_id, SingleUseTokenKind::EmailVerification).await.unwrap();

        assert!(service.redeem(&token, SingleUseTokenKind::PasswordReset).await.is_err());
    }

    #[tokio::test]
    async fn test_redeem_unknown_token_fails() {
        let service = service();
        assert!(service
            .redeem("not-a-real-token", SingleUseTokenKind::EmailVerification)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_discard_missing_token_does_not_panic() {
        let service = service();
        service.discard("nonexistent").await;
    }

    #[tokio::test]
    async fn test_issued_token_is_64_lowercase_hex_chars() {
        let service = service();
        let token = service
            .issue(Uuid::new_v4(), SingleUseTokenKind::EmailVerification)
            .await
            .unwrap();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

use crate::common::config::LockoutConfig;
use crate::error::{Error, Result};
use crate::models::LoginAttempt;
use crate::storage::LoginAttemptStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Counts failed logins per (ip, username) within a rolling window and
/// decides whether an account is currently locked out.
pub struct LockoutAccountant {
    attempts: Arc<dyn LoginAttemptStore>,
    config: LockoutConfig,
}

impl LockoutAccountant {
    pub fn new(attempts: Arc<dyn LoginAttemptStore>, config: LockoutConfig) -> Self {
        Self { attempts, config }
    }

    /// `maxLoginAttempts <= 0` disables lockout entirely rather than
    /// panicking or treating every login as locked.
    pub async fn is_locked(&self, ip: &str, username: &str) -> Result<bool> {
        if self.config.failed_attempt_limit == 0 {
            return Ok(false);
        }

        let since = Utc::now() - Duration::seconds(self.config.window_secs);
        let failed = self
            .attempts
            .count_failed_since(ip, username, since)
            .await
            .map_err(|e| {
                tracing::error!(ip, username, error = %e, "lockout check failed");
                Error::Internal("lockout check failed".to_string())
            })?;

        Ok(failed >= self.config.failed_attempt_limit as u64)
    }

    /// Seconds the caller should wait before retrying, surfaced as
    /// `Retry-After`. A flat window length rather than a computed
    /// time-to-expiry, since the store only reports a count, not which
    /// attempt will next age out of the window.
    pub fn retry_after_secs(&self) -> u64 {
        self.config.window_secs.max(0) as u64
    }

    /// Appends an attempt. Store failures here are logged, not surfaced —
    /// a login that already succeeded or failed for a real reason must not
    /// be turned into a 500 because the audit write failed.
    pub async fn record(&self, ip: &str, username: &str, succeeded: bool) {
        let attempt = LoginAttempt {
            id: Uuid::new_v4(),
            username: username.to_string(),
            ip: ip.to_string(),
            succeeded,
            occurred_at: Utc::now(),
        };

        if let Err(e) = self.attempts.record(&attempt).await {
            tracing::error!(ip, username, error = %e, "failed to record login attempt");
        }
    }

    /// Periodic maintenance: drops attempts older than 24h so the store
    /// doesn't grow unbounded. Not wired to the decision path — expired
    /// attempts are already ignored by `count_failed_since`'s `since` bound.
    pub async fn cleanup_before(&self, before: chrono::DateTime<Utc>) -> Result<u64> {
        self.attempts.cleanup_before(before).await
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// TOTP enrollment for a user. `secret_encrypted` is the base32 TOTP seed
/// wrapped with the same envelope format as [`crate::common::encryption::EncryptionManager`].
/// `backup_codes` are Argon2 hashes; each is cleared on consumption.
#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorEnrollment {
    pub user_id: Uuid,
    pub secret_encrypted: String,
    pub enabled: bool,
    #[sqlx(json)]
    pub backup_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub enabled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorEnrollResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// The user's master key, itself encrypted under a key derived from their
/// password. Rotated whenever the password changes.
#[derive(Debug, Clone, FromRow)]
pub struct EncryptedMasterKey {
    pub user_id: Uuid,
    pub ciphertext: String,
    pub nonce: String,
    pub salt: String,
    pub iterations: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
pub enum SingleUseTokenKind {
    EmailVerification,
    PasswordReset,
}

/// A high-entropy, single-use token. Looked up by its raw value, consumed
/// atomically on first successful use, and rejected afterward.
#[derive(Debug, Clone, FromRow)]
pub struct SingleUseToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub kind: SingleUseTokenKind,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SingleUseToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

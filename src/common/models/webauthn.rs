use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered WebAuthn credential. `passkey_json` holds the serialized
/// `webauthn_rs::prelude::Passkey`, which already tracks its own signature
/// counter; we keep a denormalized copy here so storage layers can enforce
/// monotonicity without deserializing on every read.
#[derive(Debug, Clone, FromRow)]
pub struct WebAuthnCredential {
    pub credential_id: String,
    pub user_id: Uuid,
    pub passkey_json: serde_json::Value,
    pub counter: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

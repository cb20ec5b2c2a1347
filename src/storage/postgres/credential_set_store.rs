use crate::error::{Error, Result};
use crate::models::WebAuthnCredential;
use crate::storage::CredentialSetStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgCredentialSetStore {
    pool: PgPool,
}

impl PgCredentialSetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialSetStore for PgCredentialSetStore {
    async fn get_all(&self, user_id: Uuid) -> Result<Vec<WebAuthnCredential>> {
        sqlx::query_as::<_, WebAuthnCredential>(
            "SELECT * FROM webauthn_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn upsert(&self, credential: &WebAuthnCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_credentials (credential_id, user_id, passkey_json, counter, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (credential_id) DO UPDATE SET
                passkey_json = EXCLUDED.passkey_json,
                counter = EXCLUDED.counter,
                last_used_at = EXCLUDED.last_used_at
            "#,
        )
        .bind(&credential.credential_id)
        .bind(credential.user_id)
        .bind(&credential.passkey_json)
        .bind(credential.counter)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn update_counter(
        &self,
        credential_id: &str,
        counter: i64,
        last_used_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE webauthn_credentials SET counter = $1, last_used_at = $2 WHERE credential_id = $3",
        )
        .bind(counter)
        .bind(last_used_at)
        .bind(credential_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("webauthn credential".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, credential_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM webauthn_credentials WHERE user_id = $1 AND credential_id = $2")
            .bind(user_id)
            .bind(credential_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

use crate::error::{Error, Result};
use crate::storage::CredentialStore;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// The encrypted-table half of the hybrid password manager: one row per
/// (user, connection), holding an already-encrypted secret and a migration
/// flag the background migration flips once the keychain copy has been
/// superseded.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get(&self, user_id: Uuid, connection_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT ciphertext FROM encrypted_credentials WHERE user_id = $1 AND connection_id = $2",
        )
        .bind(user_id)
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(row.map(|(ciphertext,)| ciphertext))
    }

    async fn set(&self, user_id: Uuid, connection_id: &str, ciphertext: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encrypted_credentials (user_id, connection_id, ciphertext, migrated, created_at, updated_at)
            VALUES ($1, $2, $3, false, now(), now())
            ON CONFLICT (user_id, connection_id) DO UPDATE SET
                ciphertext = EXCLUDED.ciphertext,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(ciphertext)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM encrypted_credentials WHERE user_id = $1 AND connection_id = $2")
            .bind(user_id)
            .bind(connection_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn mark_migrated(&self, user_id: Uuid, connection_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE encrypted_credentials SET migrated = true WHERE user_id = $1 AND connection_id = $2",
        )
        .bind(user_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }
}

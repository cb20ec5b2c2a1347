use crate::error::{Error, Result};
use crate::models::EncryptedMasterKey;
use crate::storage::MasterKeyStore;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgMasterKeyStore {
    pool: PgPool,
}

impl PgMasterKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MasterKeyStore for PgMasterKeyStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<EncryptedMasterKey>> {
        sqlx::query_as::<_, EncryptedMasterKey>(
            "SELECT * FROM encrypted_master_keys WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn upsert(&self, key: &EncryptedMasterKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encrypted_master_keys (user_id, ciphertext, nonce, salt, iterations, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                ciphertext = EXCLUDED.ciphertext,
                nonce = EXCLUDED.nonce,
                salt = EXCLUDED.salt,
                iterations = EXCLUDED.iterations,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.user_id)
        .bind(&key.ciphertext)
        .bind(&key.nonce)
        .bind(&key.salt)
        .bind(key.iterations)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM encrypted_master_keys WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

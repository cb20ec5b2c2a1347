use crate::error::{Error, Result};
use crate::models::{SingleUseToken, SingleUseTokenKind};
use crate::storage::SingleUseTokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgSingleUseTokenStore {
    pool: PgPool,
}

impl PgSingleUseTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SingleUseTokenStore for PgSingleUseTokenStore {
    async fn create(&self, token: &SingleUseToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO single_use_tokens (id, user_id, token, kind, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.kind)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict("token already exists".to_string())
            }
            _ => Error::from(e),
        })?;
        Ok(())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<SingleUseToken>> {
        sqlx::query_as::<_, SingleUseToken>("SELECT * FROM single_use_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)
    }

    async fn mark_used(&self, token: &str, kind: SingleUseTokenKind, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE single_use_tokens SET used_at = $1 WHERE token = $2 AND kind = $3",
        )
        .bind(at)
        .bind(token)
        .bind(kind)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("single-use token".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM single_use_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM single_use_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(result.rows_affected())
    }
}

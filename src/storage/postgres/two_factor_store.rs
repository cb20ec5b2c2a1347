use crate::error::{Error, Result};
use crate::models::TwoFactorEnrollment;
use crate::storage::TwoFactorStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgTwoFactorStore {
    pool: PgPool,
}

impl PgTwoFactorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TwoFactorStore for PgTwoFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorEnrollment>> {
        sqlx::query_as::<_, TwoFactorEnrollment>("SELECT * FROM two_factor WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)
    }

    async fn create(&self, enrollment: &TwoFactorEnrollment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor (user_id, secret_encrypted, enabled, backup_codes, created_at, enabled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(enrollment.user_id)
        .bind(&enrollment.secret_encrypted)
        .bind(enrollment.enabled)
        .bind(sqlx::types::Json(&enrollment.backup_codes))
        .bind(enrollment.created_at)
        .bind(enrollment.enabled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict("two-factor already configured".to_string())
            }
            _ => Error::from(e),
        })?;
        Ok(())
    }

    async fn enable(&self, user_id: Uuid, enabled_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE two_factor SET enabled = true, enabled_at = $1 WHERE user_id = $2",
        )
        .bind(enabled_at)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("two-factor enrollment".to_string()));
        }
        Ok(())
    }

    /// Locks the row, checks membership in-process, and rewrites the set
    /// within the same transaction — the row lock is what makes two
    /// concurrent callers presenting the same code linearize instead of
    /// racing.
    async fn consume_backup_code(&self, user_id: Uuid, hashed_code: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        let row: Option<(sqlx::types::Json<Vec<String>>,)> = sqlx::query_as(
            "SELECT backup_codes FROM two_factor WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::from)?;

        let Some((sqlx::types::Json(mut codes),)) = row else {
            return Ok(false);
        };

        let before = codes.len();
        codes.retain(|c| c != hashed_code);
        if codes.len() == before {
            tx.commit().await.map_err(Error::from)?;
            return Ok(false);
        }

        sqlx::query("UPDATE two_factor SET backup_codes = $1 WHERE user_id = $2")
            .bind(sqlx::types::Json(&codes))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;

        tx.commit().await.map_err(Error::from)?;
        Ok(true)
    }

    async fn replace_backup_codes(&self, user_id: Uuid, hashed_codes: Vec<String>) -> Result<()> {
        let result = sqlx::query("UPDATE two_factor SET backup_codes = $1 WHERE user_id = $2")
            .bind(sqlx::types::Json(hashed_codes))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("two-factor enrollment".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM two_factor WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

use crate::error::{Error, Result};
use crate::models::LoginAttempt;
use crate::storage::LoginAttemptStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgLoginAttemptStore {
    pool: PgPool,
}

impl PgLoginAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptStore for PgLoginAttemptStore {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()> {
        sqlx::query(
            "INSERT INTO login_attempts (id, username, ip, succeeded, occurred_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(attempt.id)
        .bind(&attempt.username)
        .bind(&attempt.ip)
        .bind(attempt.succeeded)
        .bind(attempt.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn count_failed_since(&self, ip: &str, username: &str, since: DateTime<Utc>) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM login_attempts WHERE ip = $1 AND username = $2 AND succeeded = false AND occurred_at >= $3",
        )
        .bind(ip)
        .bind(username)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(row.0 as u64)
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE occurred_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(result.rows_affected())
    }
}

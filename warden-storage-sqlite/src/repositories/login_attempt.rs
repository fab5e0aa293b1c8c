//! SQLite implementation of the login attempt repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error, error::StorageError, record::LoginAttemptRecord,
    repositories::LoginAttemptRepository,
};

use super::from_timestamp_millis;

pub struct SqliteLoginAttemptRepository {
    pool: SqlitePool,
}

impl SqliteLoginAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginAttempt {
    account: String,
    login_hit_count: i64,
    is_temp_blocked: bool,
    temp_block_time: Option<i64>,
    updated_at: i64,
}

impl TryFrom<SqliteLoginAttempt> for LoginAttemptRecord {
    type Error = Error;

    fn try_from(row: SqliteLoginAttempt) -> Result<Self, Self::Error> {
        Ok(LoginAttemptRecord {
            account: row.account,
            login_hit_count: row.login_hit_count.max(0) as u32,
            is_temp_blocked: row.is_temp_blocked,
            temp_block_time: row.temp_block_time.map(from_timestamp_millis).transpose()?,
            updated_at: from_timestamp_millis(row.updated_at)?,
        })
    }
}

#[async_trait]
impl LoginAttemptRepository for SqliteLoginAttemptRepository {
    async fn get(&self, account: &str) -> Result<Option<LoginAttemptRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            SELECT account, login_hit_count, is_temp_blocked, temp_block_time, updated_at
            FROM login_attempts
            WHERE account = ?
            "#,
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get login attempts");
            StorageError::Database("Failed to get login attempts".to_string())
        })?;

        row.map(LoginAttemptRecord::try_from).transpose()
    }

    async fn increment_hit(&self, account: &str, now: DateTime<Utc>) -> Result<u32, Error> {
        let hits: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO login_attempts (account, login_hit_count, updated_at)
            VALUES (?, 1, ?)
            ON CONFLICT (account) DO UPDATE SET
                login_hit_count = login_hit_count + 1,
                updated_at = excluded.updated_at
            RETURNING login_hit_count
            "#,
        )
        .bind(account)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record failed login");
            StorageError::Database("Failed to record failed login".to_string())
        })?;

        Ok(hits.max(0) as u32)
    }

    async fn mark_blocked(&self, account: &str, now: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE login_attempts
            SET is_temp_blocked = 1, temp_block_time = ?, updated_at = ?
            WHERE account = ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .bind(account)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to block login");
            StorageError::Database("Failed to block login".to_string())
        })?;

        Ok(())
    }

    async fn reset(&self, account: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE login_attempts
            SET login_hit_count = 0, is_temp_blocked = 0, temp_block_time = NULL
            WHERE account = ?
            "#,
        )
        .bind(account)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to reset login attempts");
            StorageError::Database("Failed to reset login attempts".to_string())
        })?;

        Ok(())
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE login_attempts
            SET login_hit_count = 0, is_temp_blocked = 0, temp_block_time = NULL
            WHERE is_temp_blocked = 1 AND temp_block_time < ?
            "#,
        )
        .bind(blocked_before.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to release expired login blocks");
            StorageError::Database("Failed to release expired login blocks".to_string())
        })?;

        Ok(result.rows_affected())
    }
}

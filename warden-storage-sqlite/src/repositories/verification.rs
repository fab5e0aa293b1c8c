//! SQLite implementation of the verification repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::StorageError,
    identifier::{Channel, Identifier},
    record::VerificationRecord,
    repositories::VerificationRepository,
};

use super::from_timestamp_millis;

pub struct SqliteVerificationRepository {
    pool: SqlitePool,
}

impl SqliteVerificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteVerificationRecord {
    channel: String,
    identifier: String,
    code: Option<String>,
    hit_count: i64,
    is_blocked: bool,
    blocked_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteVerificationRecord> for VerificationRecord {
    type Error = Error;

    fn try_from(row: SqliteVerificationRecord) -> Result<Self, Self::Error> {
        let channel: Channel = row.channel.parse().map_err(|e| {
            tracing::error!(error = %e, "Stored verification record has unknown channel");
            StorageError::Database("Corrupt verification record".to_string())
        })?;
        let identifier = Identifier::parse(channel, &row.identifier).map_err(|e| {
            tracing::error!(error = %e, "Stored verification record has invalid identifier");
            StorageError::Database("Corrupt verification record".to_string())
        })?;

        Ok(VerificationRecord {
            identifier,
            code: row.code,
            created_at: from_timestamp_millis(row.created_at)?,
            updated_at: from_timestamp_millis(row.updated_at)?,
            hit_count: row.hit_count.max(0) as u32,
            is_blocked: row.is_blocked,
            blocked_at: row.blocked_at.map(from_timestamp_millis).transpose()?,
        })
    }
}

const COLUMNS: &str =
    "channel, identifier, code, hit_count, is_blocked, blocked_at, created_at, updated_at";

#[async_trait]
impl VerificationRepository for SqliteVerificationRepository {
    async fn get(&self, identifier: &Identifier) -> Result<Option<VerificationRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteVerificationRecord>(&format!(
            "SELECT {COLUMNS} FROM verification_records WHERE channel = ? AND identifier = ?"
        ))
        .bind(identifier.channel().as_str())
        .bind(identifier.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get verification record");
            StorageError::Database("Failed to get verification record".to_string())
        })?;

        row.map(VerificationRecord::try_from).transpose()
    }

    async fn upsert_issued(
        &self,
        identifier: &Identifier,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, Error> {
        let row = sqlx::query_as::<_, SqliteVerificationRecord>(&format!(
            r#"
            INSERT INTO verification_records (channel, identifier, code, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (channel, identifier) DO UPDATE SET
                code = excluded.code,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identifier.channel().as_str())
        .bind(identifier.value())
        .bind(code)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store verification code");
            StorageError::Database("Failed to store verification code".to_string())
        })?;

        row.try_into()
    }

    async fn increment_hit(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        let hits: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE verification_records
            SET hit_count = hit_count + 1, updated_at = ?
            WHERE channel = ? AND identifier = ?
            RETURNING hit_count
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(identifier.channel().as_str())
        .bind(identifier.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to increment hit count");
            StorageError::Database("Failed to increment hit count".to_string())
        })?;

        Ok(hits.map(|h| h.max(0) as u32))
    }

    async fn mark_blocked(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE verification_records
            SET is_blocked = 1, blocked_at = ?, updated_at = ?
            WHERE channel = ? AND identifier = ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .bind(identifier.channel().as_str())
        .bind(identifier.value())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to block verification record");
            StorageError::Database("Failed to block verification record".to_string())
        })?;

        Ok(())
    }

    async fn reset(&self, identifier: &Identifier) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE verification_records
            SET hit_count = 0, is_blocked = 0, blocked_at = NULL
            WHERE channel = ? AND identifier = ?
            "#,
        )
        .bind(identifier.channel().as_str())
        .bind(identifier.value())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to reset verification record");
            StorageError::Database("Failed to reset verification record".to_string())
        })?;

        Ok(())
    }

    async fn delete(&self, identifier: &Identifier) -> Result<bool, Error> {
        let result =
            sqlx::query("DELETE FROM verification_records WHERE channel = ? AND identifier = ?")
                .bind(identifier.channel().as_str())
                .bind(identifier.value())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to delete verification record");
                    StorageError::Database("Failed to delete verification record".to_string())
                })?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE verification_records
            SET hit_count = 0, is_blocked = 0, blocked_at = NULL
            WHERE is_blocked = 1 AND blocked_at < ?
            "#,
        )
        .bind(blocked_before.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to release expired blocks");
            StorageError::Database("Failed to release expired blocks".to_string())
        })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use warden_core::repositories::RepositoryProvider;

    use super::*;
    use crate::repositories::SqliteRepositoryProvider;

    async fn setup_repo() -> SqliteVerificationRepository {
        let _ = tracing_subscriber::fmt().try_init();
        let pool = crate::tests::memory_pool().await;
        SqliteRepositoryProvider::new(pool.clone())
            .migrate()
            .await
            .unwrap();
        SqliteVerificationRepository::new(pool)
    }

    fn phone() -> Identifier {
        Identifier::phone("+15550001").unwrap()
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_then_preserves_counters() {
        let repo = setup_repo().await;

        let created = repo
            .upsert_issued(&phone(), "111111", at(1_000))
            .await
            .unwrap();
        assert_eq!(created.hit_count, 0);
        assert!(!created.is_blocked);
        assert_eq!(created.created_at, at(1_000));

        assert_eq!(repo.increment_hit(&phone(), at(1_010)).await.unwrap(), Some(1));
        assert_eq!(repo.increment_hit(&phone(), at(1_020)).await.unwrap(), Some(2));

        let reissued = repo
            .upsert_issued(&phone(), "222222", at(1_100))
            .await
            .unwrap();
        assert_eq!(reissued.code.as_deref(), Some("222222"));
        assert_eq!(reissued.hit_count, 2);
        assert_eq!(reissued.updated_at, at(1_100));
    }

    #[tokio::test]
    async fn test_channels_are_separate_keys() {
        let repo = setup_repo().await;
        let email = Identifier::email("User@Example.com").unwrap();

        repo.upsert_issued(&phone(), "111111", at(1_000))
            .await
            .unwrap();
        repo.upsert_issued(&email, "222222", at(1_000))
            .await
            .unwrap();

        let stored = repo.get(&email).await.unwrap().unwrap();
        assert_eq!(stored.identifier.value(), "user@example.com");
        assert_eq!(stored.code.as_deref(), Some("222222"));

        assert!(repo.delete(&phone()).await.unwrap());
        assert!(!repo.delete(&phone()).await.unwrap());
        assert!(repo.get(&email).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_block_reset_and_release() {
        let repo = setup_repo().await;
        let email = Identifier::email("user@example.com").unwrap();
        repo.upsert_issued(&phone(), "111111", at(1_000))
            .await
            .unwrap();
        repo.upsert_issued(&email, "222222", at(1_000))
            .await
            .unwrap();

        repo.mark_blocked(&phone(), at(1_000)).await.unwrap();
        repo.mark_blocked(&email, at(1_500)).await.unwrap();
        let blocked = repo.get(&phone()).await.unwrap().unwrap();
        assert!(blocked.is_blocked);
        assert_eq!(blocked.blocked_at, Some(at(1_000)));

        let released = repo.release_expired_blocks(at(1_400)).await.unwrap();
        assert_eq!(released, 1);
        assert!(!repo.get(&phone()).await.unwrap().unwrap().is_blocked);
        assert!(repo.get(&email).await.unwrap().unwrap().is_blocked);

        repo.reset(&email).await.unwrap();
        let reset = repo.get(&email).await.unwrap().unwrap();
        assert!(!reset.is_blocked);
        assert!(reset.blocked_at.is_none());
        assert_eq!(reset.code.as_deref(), Some("222222"));
    }

    #[tokio::test]
    async fn test_increment_missing_record() {
        let repo = setup_repo().await;
        assert_eq!(repo.increment_hit(&phone(), at(1_000)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let repo = Arc::new(setup_repo().await);
        repo.upsert_issued(&phone(), "111111", at(1_000))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.increment_hit(&phone(), at(1_001)).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        let record = repo.get(&phone()).await.unwrap().unwrap();
        assert_eq!(record.hit_count, 10);
        assert_eq!(record.updated_at, at(1_000) + Duration::seconds(1));
    }
}

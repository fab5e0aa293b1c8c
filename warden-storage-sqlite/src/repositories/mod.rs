//! Repository implementations for SQLite storage

pub mod login_attempt;
pub mod verification;

pub use login_attempt::SqliteLoginAttemptRepository;
pub use verification::SqliteVerificationRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::{
        LoginAttemptRepositoryProvider, RepositoryProvider, VerificationRepositoryProvider,
    },
};
use warden_migration::MigrationManager;

use crate::migrations::{self, SqliteMigrationManager};

/// Stored timestamps are unix milliseconds.
pub(crate) fn from_timestamp_millis(ts: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(ts)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp: {ts}")).into())
}

/// Repository provider implementation for SQLite
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    verification: SqliteVerificationRepository,
    login_attempt: SqliteLoginAttemptRepository,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let verification = SqliteVerificationRepository::new(pool.clone());
        let login_attempt = SqliteLoginAttemptRepository::new(pool.clone());

        Self {
            pool,
            verification,
            login_attempt,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl VerificationRepositoryProvider for SqliteRepositoryProvider {
    type VerificationRepo = SqliteVerificationRepository;

    fn verification(&self) -> &Self::VerificationRepo {
        &self.verification
    }
}

impl LoginAttemptRepositoryProvider for SqliteRepositoryProvider {
    type LoginAttemptRepo = SqliteLoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo {
        &self.login_attempt
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Health check failed")?;
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Database, Sqlite, SqlitePool};
use warden_migration::{
    Migration, MigrationError, MigrationManager, MigrationRecord, check_version_order,
};

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Every schema step of the SQLite backend, in order.
pub fn all() -> Vec<Box<dyn Migration<Sqlite>>> {
    vec![
        Box::new(CreateVerificationRecordsTable),
        Box::new(CreateLoginAttemptsTable),
        Box::new(CreateBlockIndexes),
    ]
}

#[async_trait]
impl MigrationManager<Sqlite> for SqliteMigrationManager {
    async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(
            format!(
                r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (unixepoch())
            );"#,
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn up(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<(), MigrationError> {
        check_version_order(migrations)?;

        for migration in migrations {
            if self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applying migration"
            );

            migration
                .up(&mut *tx as &mut <Sqlite as Database>::Connection)
                .await?;

            sqlx::query(
                format!(
                    "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                    self.get_migration_table_name()
                )
                .as_str(),
            )
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    async fn down(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<(), MigrationError> {
        for migration in migrations.iter().rev() {
            if !self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Rolling back migration"
            );

            migration
                .down(&mut *tx as &mut <Sqlite as Database>::Connection)
                .await?;

            sqlx::query(
                format!(
                    "DELETE FROM {} WHERE version = ?",
                    self.get_migration_table_name()
                )
                .as_str(),
            )
            .bind(migration.version())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = sqlx::query_as::<_, MigrationRecord>(
            format!(
                "SELECT version, name, applied_at FROM {} ORDER BY version",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn is_applied(&self, version: i64) -> Result<bool, MigrationError> {
        let result: bool = sqlx::query_scalar(
            format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE version = ?)",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}

/// One row per (channel, identifier). Timestamps are unix milliseconds.
pub struct CreateVerificationRecordsTable;

#[async_trait]
impl Migration<Sqlite> for CreateVerificationRecordsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateVerificationRecordsTable"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS verification_records (
                channel TEXT NOT NULL,
                identifier TEXT NOT NULL,
                code TEXT,
                hit_count INTEGER NOT NULL DEFAULT 0,
                is_blocked BOOLEAN NOT NULL DEFAULT 0,
                blocked_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (channel, identifier)
            )
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS verification_records")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateLoginAttemptsTable;

#[async_trait]
impl Migration<Sqlite> for CreateLoginAttemptsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateLoginAttemptsTable"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS login_attempts (
                account TEXT PRIMARY KEY,
                login_hit_count INTEGER NOT NULL DEFAULT 0,
                is_temp_blocked BOOLEAN NOT NULL DEFAULT 0,
                temp_block_time INTEGER,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS login_attempts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Partial indexes for the expired-block sweep.
pub struct CreateBlockIndexes;

#[async_trait]
impl Migration<Sqlite> for CreateBlockIndexes {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateBlockIndexes"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_verification_records_blocked_at \
             ON verification_records(blocked_at) WHERE is_blocked = 1",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_login_attempts_temp_block_time \
             ON login_attempts(temp_block_time) WHERE is_temp_blocked = 1",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP INDEX IF EXISTS idx_verification_records_blocked_at")
            .execute(&mut *conn)
            .await?;
        sqlx::query("DROP INDEX IF EXISTS idx_login_attempts_temp_block_time")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Records the versions it reverts.
    struct Tracked {
        version: i64,
        reverted: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl Migration<Sqlite> for Tracked {
        async fn up<'a>(
            &'a self,
            _conn: &'a mut <Sqlite as Database>::Connection,
        ) -> Result<(), MigrationError> {
            Ok(())
        }

        async fn down<'a>(
            &'a self,
            _conn: &'a mut <Sqlite as Database>::Connection,
        ) -> Result<(), MigrationError> {
            self.reverted.lock().unwrap().push(self.version);
            Ok(())
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn name(&self) -> &str {
            "tracked"
        }
    }

    fn setup_test() {
        let _ = tracing_subscriber::fmt().try_init();
    }

    async fn manager() -> SqliteMigrationManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        SqliteMigrationManager::new(pool)
    }

    #[tokio::test]
    async fn test_migrations() -> Result<(), MigrationError> {
        setup_test();
        let manager = manager().await;
        manager.initialize().await?;

        let migrations = all();
        manager.up(&migrations).await?;
        assert!(manager.is_applied(3).await?);

        let applied = manager.get_applied_migrations().await?;
        let versions: Vec<i64> = applied.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        manager.down(&migrations).await?;
        assert!(!manager.is_applied(1).await?);
        assert!(manager.get_applied_migrations().await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_up_is_idempotent() -> Result<(), MigrationError> {
        setup_test();
        let manager = manager().await;
        manager.initialize().await?;

        manager.up(&all()).await?;
        manager.up(&all()).await?;
        assert_eq!(manager.get_applied_migrations().await?.len(), 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_order_list_is_rejected() -> Result<(), MigrationError> {
        setup_test();
        let manager = manager().await;
        manager.initialize().await?;

        let migrations: Vec<Box<dyn Migration<Sqlite>>> =
            vec![Box::new(CreateLoginAttemptsTable), Box::new(CreateVerificationRecordsTable)];
        let err = manager.up(&migrations).await.unwrap_err();
        assert!(matches!(err, MigrationError::Ordering(_)));
        assert!(!manager.is_applied(2).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_down_reverts_newest_first() -> Result<(), MigrationError> {
        setup_test();
        let manager = manager().await;
        manager.initialize().await?;

        let reverted = Arc::new(Mutex::new(Vec::new()));
        let migrations: Vec<Box<dyn Migration<Sqlite>>> = (1..=3)
            .map(|version| {
                Box::new(Tracked {
                    version,
                    reverted: reverted.clone(),
                }) as Box<dyn Migration<Sqlite>>
            })
            .collect();

        manager.up(&migrations).await?;
        manager.down(&migrations).await?;
        assert_eq!(*reverted.lock().unwrap(), vec![3, 2, 1]);

        Ok(())
    }
}

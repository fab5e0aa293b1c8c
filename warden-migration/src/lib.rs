//! Schema migration traits shared by the SQL storage backends.
//!
//! A backend implements [`Migration`] once per schema step and a [`MigrationManager`]
//! that records applied versions in its own tracking table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Database;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Migration versions out of order: {0}")]
    Ordering(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Apply the schema step inside the manager's transaction
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Revert the schema step
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique, strictly increasing version number
    fn version(&self) -> i64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix seconds.
    pub applied_at: i64,
}

impl MigrationRecord {
    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.applied_at, 0)
    }
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_warden_migrations"
    }

    /// Create the tracking table if needed
    async fn initialize(&self) -> Result<()>;

    /// Apply every migration not yet recorded, in the given order
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Revert every recorded migration, in reverse of the given order
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    async fn is_applied(&self, version: i64) -> Result<bool>;
}

/// Reject a migration list whose versions are not strictly increasing.
pub fn check_version_order<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    check_versions(migrations.iter().map(|m| (m.version(), m.name())))
}

fn check_versions<'a>(versions: impl IntoIterator<Item = (i64, &'a str)>) -> Result<()> {
    let mut previous: Option<(i64, &str)> = None;
    for (version, name) in versions {
        if let Some((prev_version, prev_name)) = previous {
            if version <= prev_version {
                return Err(MigrationError::Ordering(format!(
                    "{name} ({version}) follows {prev_name} ({prev_version})"
                )));
            }
        }
        previous = Some((version, name));
    }
    Ok(())
}

//! SQLite storage backend for warden.
//!
//! ```rust,ignore
//! use warden_core::repositories::RepositoryProvider;
//! use warden_storage_sqlite::SqliteRepositoryProvider;
//!
//! let pool = sqlx::SqlitePool::connect("sqlite://warden.db?mode=rwc").await?;
//! let provider = SqliteRepositoryProvider::new(pool);
//! provider.migrate().await?;
//! ```
//!
//! All timestamps are stored as unix milliseconds. Counter updates are single
//! `UPDATE ... RETURNING` statements, so concurrent failures are never lost.

pub mod migrations;
pub mod repositories;

pub use repositories::{
    SqliteLoginAttemptRepository, SqliteRepositoryProvider, SqliteVerificationRepository,
};

#[cfg(test)]
pub(crate) mod tests {
    use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

    /// A private in-memory database. One connection, since every `:memory:`
    /// connection opens a separate database.
    pub(crate) async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool")
    }
}

//! Repository traits for the data access layer
//!
//! Services talk to storage only through these traits.
//!
//! # Trait Hierarchy
//!
//! - [`VerificationRepository`] and [`LoginAttemptRepository`] define the operations
//! - [`VerificationRepositoryProvider`] and [`LoginAttemptRepositoryProvider`] give
//!   access to a backend's implementation of each
//! - [`RepositoryProvider`] combines both providers with lifecycle methods
//!
//! [`memory::InMemoryRepositoryProvider`] is a complete backend for tests and
//! single-process deployments. The SQLite backend lives in `warden-storage-sqlite`.

pub mod adapter;
pub mod login_attempt;
pub mod memory;
pub mod verification;

pub use adapter::{LoginAttemptRepositoryAdapter, VerificationRepositoryAdapter};
pub use login_attempt::LoginAttemptRepository;
pub use memory::{
    InMemoryLoginAttemptRepository, InMemoryRepositoryProvider, InMemoryVerificationRepository,
};
pub use verification::VerificationRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for verification record access.
pub trait VerificationRepositoryProvider: Send + Sync + 'static {
    type VerificationRepo: VerificationRepository;

    fn verification(&self) -> &Self::VerificationRepo;
}

/// Provider trait for login attempt access.
pub trait LoginAttemptRepositoryProvider: Send + Sync + 'static {
    type LoginAttemptRepo: LoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo;
}

/// Everything a storage backend must provide.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement [`VerificationRepository`] and [`LoginAttemptRepository`]
/// 2. Implement both provider traits
/// 3. Implement this trait with `migrate()` and `health_check()`
#[async_trait]
pub trait RepositoryProvider:
    VerificationRepositoryProvider + LoginAttemptRepositoryProvider
{
    /// Bring the schema up to date. Must be idempotent.
    async fn migrate(&self) -> Result<(), Error>;

    /// Fails with `Error::Storage` when the backend is unreachable.
    async fn health_check(&self) -> Result<(), Error>;
}

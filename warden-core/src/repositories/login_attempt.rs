//! Repository trait for login throttling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, record::LoginAttemptRecord};

/// Failed-login counters per account.
///
/// Counters should be kept for any account string that is attempted, existing or
/// not, so that throttling behaves the same for unknown accounts and does not reveal
/// which accounts exist.
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync + 'static {
    async fn get(&self, account: &str) -> Result<Option<LoginAttemptRecord>, Error>;

    /// Atomically add one failed login, creating the record on first failure.
    ///
    /// # Returns
    ///
    /// The hit count after incrementing.
    async fn increment_hit(&self, account: &str, now: DateTime<Utc>) -> Result<u32, Error>;

    /// Start a temporary block. A no-op for unknown accounts.
    async fn mark_blocked(&self, account: &str, now: DateTime<Utc>) -> Result<(), Error>;

    /// Clear counters and block state.
    async fn reset(&self, account: &str) -> Result<(), Error>;

    /// Reset every account whose block started before `blocked_before`.
    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error>;
}

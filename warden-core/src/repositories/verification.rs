//! Repository trait for OTP verification records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, identifier::Identifier, record::VerificationRecord};

/// Storage for one verification record per identifier.
///
/// Records are keyed by `(channel, value)`: a phone number and an email address
/// never share a record even if their strings coincide.
///
/// # Concurrency
///
/// Concurrent failed attempts against the same identifier are expected (retries from
/// flaky clients, scripted guessing). [`increment_hit`](Self::increment_hit) must be
/// an atomic counter update at the storage layer, never a read followed by a write,
/// so that no failed attempt goes uncounted.
///
/// # Failures
///
/// An unreachable store must surface as `Error::Storage`. Callers never treat a
/// storage failure as permission to proceed.
#[async_trait]
pub trait VerificationRepository: Send + Sync + 'static {
    /// Fetch the record for an identifier.
    async fn get(&self, identifier: &Identifier) -> Result<Option<VerificationRecord>, Error>;

    /// Store a newly issued code.
    ///
    /// Creates the record with clean counters if it does not exist. For an existing
    /// record only `code`, `created_at` and `updated_at` change; `hit_count` and
    /// block state are preserved.
    async fn upsert_issued(
        &self,
        identifier: &Identifier,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, Error>;

    /// Atomically add one failed attempt and set `updated_at`.
    ///
    /// # Returns
    ///
    /// The hit count after incrementing, or `None` if the record no longer exists.
    async fn increment_hit(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, Error>;

    /// Start a temporary block: `is_blocked = true`, `blocked_at = now`.
    async fn mark_blocked(&self, identifier: &Identifier, now: DateTime<Utc>)
    -> Result<(), Error>;

    /// Clear the hit count and any block. The outstanding code is kept.
    async fn reset(&self, identifier: &Identifier) -> Result<(), Error>;

    /// Remove the record entirely.
    ///
    /// # Returns
    ///
    /// `true` if a record was removed.
    async fn delete(&self, identifier: &Identifier) -> Result<bool, Error>;

    /// Reset every record whose block started before `blocked_before`.
    ///
    /// Used by the optional background sweep. Records are reset, never deleted.
    ///
    /// # Returns
    ///
    /// The number of records released.
    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error>;
}

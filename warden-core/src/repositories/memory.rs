//! In-process storage backed by [`DashMap`].
//!
//! Counter updates go through `entry`/`get_mut`, which hold the shard lock for the
//! duration of the closure, so concurrent increments never lose a hit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    Error,
    identifier::Identifier,
    record::{LoginAttemptRecord, VerificationRecord},
    repositories::{
        LoginAttemptRepository, LoginAttemptRepositoryProvider, RepositoryProvider,
        VerificationRepository, VerificationRepositoryProvider,
    },
};

#[derive(Debug, Default, Clone)]
pub struct InMemoryVerificationRepository {
    records: Arc<DashMap<Identifier, VerificationRecord>>,
}

impl InMemoryVerificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VerificationRepository for InMemoryVerificationRepository {
    async fn get(&self, identifier: &Identifier) -> Result<Option<VerificationRecord>, Error> {
        Ok(self.records.get(identifier).map(|r| r.value().clone()))
    }

    async fn upsert_issued(
        &self,
        identifier: &Identifier,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, Error> {
        let record = self
            .records
            .entry(identifier.clone())
            .and_modify(|record| {
                record.code = Some(code.to_string());
                record.created_at = now;
                record.updated_at = now;
            })
            .or_insert_with(|| VerificationRecord::issued(identifier.clone(), code, now));

        Ok(record.value().clone())
    }

    async fn increment_hit(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        Ok(self.records.get_mut(identifier).map(|mut record| {
            record.hit_count += 1;
            record.updated_at = now;
            record.hit_count
        }))
    }

    async fn mark_blocked(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(mut record) = self.records.get_mut(identifier) {
            record.is_blocked = true;
            record.blocked_at = Some(now);
            record.updated_at = now;
        }
        Ok(())
    }

    async fn reset(&self, identifier: &Identifier) -> Result<(), Error> {
        if let Some(mut record) = self.records.get_mut(identifier) {
            record.clear_block();
        }
        Ok(())
    }

    async fn delete(&self, identifier: &Identifier) -> Result<bool, Error> {
        Ok(self.records.remove(identifier).is_some())
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        let mut released = 0;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.is_blocked && record.blocked_at.is_some_and(|at| at < blocked_before) {
                record.clear_block();
                released += 1;
            }
        }
        Ok(released)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryLoginAttemptRepository {
    records: Arc<DashMap<String, LoginAttemptRecord>>,
}

impl InMemoryLoginAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginAttemptRepository for InMemoryLoginAttemptRepository {
    async fn get(&self, account: &str) -> Result<Option<LoginAttemptRecord>, Error> {
        Ok(self.records.get(account).map(|r| r.value().clone()))
    }

    async fn increment_hit(&self, account: &str, now: DateTime<Utc>) -> Result<u32, Error> {
        let mut record = self
            .records
            .entry(account.to_string())
            .or_insert_with(|| LoginAttemptRecord::new(account, now));
        record.login_hit_count += 1;
        record.updated_at = now;
        Ok(record.login_hit_count)
    }

    async fn mark_blocked(&self, account: &str, now: DateTime<Utc>) -> Result<(), Error> {
        if let Some(mut record) = self.records.get_mut(account) {
            record.is_temp_blocked = true;
            record.temp_block_time = Some(now);
            record.updated_at = now;
        }
        Ok(())
    }

    async fn reset(&self, account: &str) -> Result<(), Error> {
        if let Some(mut record) = self.records.get_mut(account) {
            record.clear_block();
        }
        Ok(())
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        let mut released = 0;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.is_temp_blocked && record.temp_block_time.is_some_and(|at| at < blocked_before)
            {
                record.clear_block();
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Both in-memory repositories behind the [`RepositoryProvider`] interface.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepositoryProvider {
    verification: InMemoryVerificationRepository,
    login_attempt: InMemoryLoginAttemptRepository,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VerificationRepositoryProvider for InMemoryRepositoryProvider {
    type VerificationRepo = InMemoryVerificationRepository;

    fn verification(&self) -> &Self::VerificationRepo {
        &self.verification
    }
}

impl LoginAttemptRepositoryProvider for InMemoryRepositoryProvider {
    type LoginAttemptRepo = InMemoryLoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo {
        &self.login_attempt
    }
}

#[async_trait]
impl RepositoryProvider for InMemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

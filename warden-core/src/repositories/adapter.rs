use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    identifier::Identifier,
    record::{LoginAttemptRecord, VerificationRecord},
    repositories::{LoginAttemptRepository, RepositoryProvider, VerificationRepository},
};

/// Adapter that exposes a provider's verification repository as a standalone repository
pub struct VerificationRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> VerificationRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> VerificationRepository for VerificationRepositoryAdapter<R> {
    async fn get(&self, identifier: &Identifier) -> Result<Option<VerificationRecord>, Error> {
        self.provider.verification().get(identifier).await
    }

    async fn upsert_issued(
        &self,
        identifier: &Identifier,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, Error> {
        self.provider
            .verification()
            .upsert_issued(identifier, code, now)
            .await
    }

    async fn increment_hit(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        self.provider
            .verification()
            .increment_hit(identifier, now)
            .await
    }

    async fn mark_blocked(
        &self,
        identifier: &Identifier,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.provider
            .verification()
            .mark_blocked(identifier, now)
            .await
    }

    async fn reset(&self, identifier: &Identifier) -> Result<(), Error> {
        self.provider.verification().reset(identifier).await
    }

    async fn delete(&self, identifier: &Identifier) -> Result<bool, Error> {
        self.provider.verification().delete(identifier).await
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider
            .verification()
            .release_expired_blocks(blocked_before)
            .await
    }
}

pub struct LoginAttemptRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LoginAttemptRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LoginAttemptRepository for LoginAttemptRepositoryAdapter<R> {
    async fn get(&self, account: &str) -> Result<Option<LoginAttemptRecord>, Error> {
        self.provider.login_attempt().get(account).await
    }

    async fn increment_hit(&self, account: &str, now: DateTime<Utc>) -> Result<u32, Error> {
        self.provider.login_attempt().increment_hit(account, now).await
    }

    async fn mark_blocked(&self, account: &str, now: DateTime<Utc>) -> Result<(), Error> {
        self.provider.login_attempt().mark_blocked(account, now).await
    }

    async fn reset(&self, account: &str) -> Result<(), Error> {
        self.provider.login_attempt().reset(account).await
    }

    async fn release_expired_blocks(&self, blocked_before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider
            .login_attempt()
            .release_expired_blocks(blocked_before)
            .await
    }
}

//! Login attempt throttling.
//!
//! Applies the same policy as OTP verification to password logins, using
//! `maximum_login_hit` and `temporary_login_block_time`. Call [`check`] before
//! authenticating, then [`record_failure`] or [`record_success`] depending on the
//! result.
//!
//! [`check`]: LoginThrottleService::check
//! [`record_failure`]: LoginThrottleService::record_failure
//! [`record_success`]: LoginThrottleService::record_success

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    Error,
    clock::{Clock, SystemClock},
    policy::{Denial, DenialReason, FailureDecision, ThrottlePolicy, VerificationDecision},
    repositories::LoginAttemptRepository,
    services::{DEFAULT_CLEANUP_INTERVAL, spawn_block_release_task},
    settings::{SettingsProvider, ThrottleSettings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    Allowed,
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// Wrong credentials; `remaining` failures are left before a block.
    Invalid { remaining: u32 },
    /// This failure started a block, or one was already in force.
    Denied(Denial),
}

pub struct LoginThrottleService<R: LoginAttemptRepository> {
    repository: Arc<R>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    cleanup_interval: std::time::Duration,
}

impl<R: LoginAttemptRepository> LoginThrottleService<R> {
    pub fn new(repository: Arc<R>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            repository,
            settings,
            clock: Arc::new(SystemClock),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Gate a login attempt before credentials are checked.
    ///
    /// A block started here (hit count already at the threshold inside the window)
    /// is persisted before returning.
    pub async fn check(&self, account: &str) -> Result<LoginGate, Error> {
        let Some(record) = self.repository.get(account).await? else {
            return Ok(LoginGate::Allowed);
        };

        let policy = self.policy().await?;
        let now = self.clock.now();

        match policy.decide_verification(&record, now) {
            VerificationDecision::Deny(denial) => {
                if denial.reason == DenialReason::NewlyBlocked {
                    self.repository.mark_blocked(account, now).await?;
                    tracing::warn!(account = account, "Login temporarily blocked");
                } else {
                    tracing::info!(
                        account = account,
                        retry_after = denial.retry_after_seconds(),
                        "Login denied"
                    );
                }
                Ok(LoginGate::Denied(denial))
            }
            VerificationDecision::Allow { reset_stale_block } => {
                if reset_stale_block {
                    self.repository.reset(account).await?;
                    tracing::info!(account = account, "Released expired login block");
                }
                Ok(LoginGate::Allowed)
            }
        }
    }

    /// Count a failed login.
    ///
    /// A failure during an active block is denied with the remaining wait and leaves
    /// the block start untouched.
    pub async fn record_failure(&self, account: &str) -> Result<LoginFailure, Error> {
        let policy = self.policy().await?;
        let now = self.clock.now();

        if let Some(record) = self.repository.get(account).await? {
            if let VerificationDecision::Deny(denial) = policy.decide_verification(&record, now) {
                if denial.reason == DenialReason::BlockActive {
                    tracing::info!(
                        account = account,
                        retry_after = denial.retry_after_seconds(),
                        "Login failed during block"
                    );
                    return Ok(LoginFailure::Denied(denial));
                }
            }
        }

        let hits = self.repository.increment_hit(account, now).await?;

        match policy.decide_after_failure(hits) {
            FailureDecision::StillOpen { remaining } => {
                tracing::info!(
                    account = account,
                    hit_count = hits,
                    remaining = remaining,
                    "Login failed"
                );
                Ok(LoginFailure::Invalid { remaining })
            }
            FailureDecision::Block(denial) => {
                self.repository.mark_blocked(account, now).await?;
                tracing::warn!(account = account, hit_count = hits, "Login temporarily blocked");
                Ok(LoginFailure::Denied(denial))
            }
        }
    }

    /// Clear the counters after a successful login.
    pub async fn record_success(&self, account: &str) -> Result<(), Error> {
        self.repository.reset(account).await
    }

    /// Administrative unlock.
    ///
    /// # Returns
    ///
    /// `true` if the account was blocked.
    pub async fn unlock(&self, account: &str) -> Result<bool, Error> {
        let was_blocked = self
            .repository
            .get(account)
            .await?
            .is_some_and(|record| record.is_temp_blocked);

        self.repository.reset(account).await?;
        if was_blocked {
            tracing::info!(account = account, "Login block lifted");
        }
        Ok(was_blocked)
    }

    /// Start the background task that releases expired login blocks.
    pub fn start_cleanup_task(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let settings = Arc::clone(&self.settings);
        let clock = Arc::clone(&self.clock);

        spawn_block_release_task("login", self.cleanup_interval, shutdown, move || {
            let repository = Arc::clone(&repository);
            let settings = Arc::clone(&settings);
            let clock = Arc::clone(&clock);
            async move {
                let resolved = ThrottleSettings::resolve_login(settings.as_ref()).await?;
                // A window reaching before the earliest representable time has released nothing yet.
                let Some(before) = clock.now().checked_sub_signed(resolved.temp_block) else {
                    return Ok(0);
                };
                repository.release_expired_blocks(before).await
            }
        })
    }

    async fn policy(&self) -> Result<ThrottlePolicy, Error> {
        let settings = ThrottleSettings::resolve_login(self.settings.as_ref()).await?;
        Ok(ThrottlePolicy::new(settings))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{
        clock::ManualClock,
        repositories::InMemoryLoginAttemptRepository,
        settings::{StaticSettings, keys},
    };

    fn service() -> (
        LoginThrottleService<InMemoryLoginAttemptRepository>,
        Arc<InMemoryLoginAttemptRepository>,
        Arc<ManualClock>,
    ) {
        let repo = Arc::new(InMemoryLoginAttemptRepository::new());
        let clock = Arc::new(ManualClock::default());
        let service = LoginThrottleService::new(repo.clone(), Arc::new(StaticSettings::new()))
            .with_clock(clock.clone());
        (service, repo, clock)
    }

    #[tokio::test]
    async fn test_unknown_account_is_allowed() {
        let (service, _, _) = service();
        assert_eq!(service.check("nobody").await.unwrap(), LoginGate::Allowed);
    }

    #[tokio::test]
    async fn test_fifth_failure_blocks() {
        let (service, repo, _) = service();

        for remaining in (1..=4).rev() {
            assert_eq!(
                service.record_failure("acct").await.unwrap(),
                LoginFailure::Invalid { remaining }
            );
        }

        match service.record_failure("acct").await.unwrap() {
            LoginFailure::Denied(denial) => {
                assert_eq!(denial.reason, DenialReason::NewlyBlocked);
                assert_eq!(denial.retry_after_seconds(), 600);
            }
            other => panic!("Expected block, got {other:?}"),
        }
        assert!(repo.get("acct").await.unwrap().unwrap().is_temp_blocked);
    }

    #[tokio::test]
    async fn test_blocked_account_is_denied_until_window_passes() {
        let (service, repo, clock) = service();
        for _ in 0..5 {
            service.record_failure("acct").await.unwrap();
        }

        clock.advance(Duration::seconds(120));
        match service.check("acct").await.unwrap() {
            LoginGate::Denied(denial) => {
                assert_eq!(denial.reason, DenialReason::BlockActive);
                assert_eq!(denial.retry_after_seconds(), 480);
            }
            other => panic!("Expected active block, got {other:?}"),
        }

        clock.advance(Duration::seconds(480));
        assert_eq!(service.check("acct").await.unwrap(), LoginGate::Allowed);
        let record = repo.get("acct").await.unwrap().unwrap();
        assert_eq!(record.login_hit_count, 0);
        assert!(!record.is_temp_blocked);
    }

    #[tokio::test]
    async fn test_failure_during_block_keeps_block_start() {
        let (service, repo, clock) = service();
        for _ in 0..5 {
            service.record_failure("acct").await.unwrap();
        }
        let blocked = repo.get("acct").await.unwrap().unwrap();

        clock.advance(Duration::seconds(100));
        match service.record_failure("acct").await.unwrap() {
            LoginFailure::Denied(denial) => {
                assert_eq!(denial.reason, DenialReason::BlockActive);
                assert_eq!(denial.retry_after_seconds(), 500);
            }
            other => panic!("Expected active block, got {other:?}"),
        }

        let record = repo.get("acct").await.unwrap().unwrap();
        assert_eq!(record.temp_block_time, blocked.temp_block_time);
        assert_eq!(record.login_hit_count, blocked.login_hit_count);
        match service.check("acct").await.unwrap() {
            LoginGate::Denied(denial) => assert_eq!(denial.retry_after_seconds(), 500),
            other => panic!("Expected active block, got {other:?}"),
        }

        clock.advance(Duration::seconds(500));
        assert_eq!(service.check("acct").await.unwrap(), LoginGate::Allowed);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (service, repo, _) = service();
        for _ in 0..3 {
            service.record_failure("acct").await.unwrap();
        }

        service.record_success("acct").await.unwrap();
        assert_eq!(repo.get("acct").await.unwrap().unwrap().login_hit_count, 0);
        assert_eq!(
            service.record_failure("acct").await.unwrap(),
            LoginFailure::Invalid { remaining: 4 }
        );
    }

    #[tokio::test]
    async fn test_login_settings_are_honored() {
        let repo = Arc::new(InMemoryLoginAttemptRepository::new());
        let settings = StaticSettings::new()
            .with(keys::MAXIMUM_LOGIN_HIT, 2)
            .with(keys::TEMPORARY_LOGIN_BLOCK_TIME, 30);
        let service = LoginThrottleService::new(repo, Arc::new(settings));

        service.record_failure("acct").await.unwrap();
        match service.record_failure("acct").await.unwrap() {
            LoginFailure::Denied(denial) => assert_eq!(denial.retry_after_seconds(), 30),
            other => panic!("Expected block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unlock() {
        let (service, _, _) = service();
        assert!(!service.unlock("acct").await.unwrap());

        for _ in 0..5 {
            service.record_failure("acct").await.unwrap();
        }
        assert!(service.unlock("acct").await.unwrap());
        assert_eq!(service.check("acct").await.unwrap(), LoginGate::Allowed);
    }

    #[tokio::test]
    async fn test_cleanup_task_releases_expired_login_blocks() {
        let (service, repo, clock) = service();
        let service = service.with_cleanup_interval(std::time::Duration::from_millis(10));
        for _ in 0..5 {
            service.record_failure("acct").await.unwrap();
        }
        clock.advance(Duration::seconds(601));

        let (tx, rx) = watch::channel(false);
        let handle = service.start_cleanup_task(rx);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let record = repo.get("acct").await.unwrap().unwrap();
        assert!(!record.is_temp_blocked);
        assert_eq!(record.login_hit_count, 0);
    }
}

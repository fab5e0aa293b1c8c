//! One-time code issuance and verification.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use warden_core::{
//!     code::CodeMode,
//!     identifier::Identifier,
//!     notification::OutboxGateway,
//!     repositories::InMemoryVerificationRepository,
//!     services::{IssueOutcome, OtpService, OtpServiceConfig, VerifyOutcome},
//!     settings::StaticSettings,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), warden_core::Error> {
//! let service = OtpService::new(
//!     Arc::new(InMemoryVerificationRepository::new()),
//!     Arc::new(StaticSettings::new()),
//!     Arc::new(OutboxGateway::new()),
//!     OtpServiceConfig::default().with_code_mode(CodeMode::test()),
//! );
//!
//! let phone = Identifier::phone("+15550001")?;
//! let IssueOutcome::Issued { code } = service.request_code(&phone).await? else {
//!     unreachable!("first request is never throttled");
//! };
//! assert_eq!(service.verify_code(&phone, &code).await?, VerifyOutcome::Verified);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    Error,
    clock::{Clock, SystemClock},
    code::{CodeGenerator, CodeMode},
    error::DeliveryError,
    identifier::{Identifier, validate_submitted_code},
    notification::NotificationGateway,
    policy::{
        Denial, DenialReason, FailureDecision, IssuanceDecision, ThrottlePolicy,
        VerificationDecision,
    },
    repositories::VerificationRepository,
    services::{DEFAULT_CLEANUP_INTERVAL, spawn_block_release_task},
    settings::{SettingsProvider, ThrottleSettings},
};

pub const DEFAULT_DELIVERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpServiceConfig {
    pub code_mode: CodeMode,
    /// Upper bound on a single gateway call.
    pub delivery_timeout: std::time::Duration,
    /// Period of the optional background block sweep.
    pub cleanup_interval: std::time::Duration,
}

impl Default for OtpServiceConfig {
    fn default() -> Self {
        Self {
            code_mode: CodeMode::default(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl OtpServiceConfig {
    pub fn with_code_mode(mut self, code_mode: CodeMode) -> Self {
        self.code_mode = code_mode;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The code was stored and handed to the gateway.
    Issued { code: String },
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The code matched; the record has been deleted.
    Verified,
    Denied(Denial),
    /// Wrong code, or no outstanding code at all. The two are deliberately
    /// indistinguishable.
    Invalid,
}

/// Read-only view of a verification record for support tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpStatus {
    pub identifier: Identifier,
    pub hit_count: u32,
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    /// Seconds until a new code may be requested, or zero if one may be requested now.
    pub retry_after_seconds: i64,
}

/// Issues and verifies one-time codes under the throttle policy.
///
/// # Thread Safety
///
/// The service holds no per-identifier state of its own and can be shared across
/// tasks behind an `Arc`. Concurrency control is delegated to the repository's
/// atomic operations.
pub struct OtpService<R: VerificationRepository> {
    repository: Arc<R>,
    settings: Arc<dyn SettingsProvider>,
    gateway: Arc<dyn NotificationGateway>,
    generator: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    config: OtpServiceConfig,
}

impl<R: VerificationRepository> OtpService<R> {
    pub fn new(
        repository: Arc<R>,
        settings: Arc<dyn SettingsProvider>,
        gateway: Arc<dyn NotificationGateway>,
        config: OtpServiceConfig,
    ) -> Self {
        let generator: Arc<dyn CodeGenerator> = Arc::from(config.code_mode.generator());
        Self {
            repository,
            settings,
            gateway,
            generator,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the generator derived from the configured code mode.
    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &OtpServiceConfig {
        &self.config
    }

    /// Issue a new code for `identifier` and send it.
    ///
    /// # Returns
    ///
    /// - `Issued` with the code once it is stored and delivered
    /// - `Denied` with `RateLimited` or `BlockActive` when the throttle refuses
    ///
    /// # Errors
    ///
    /// `Error::Delivery` when the gateway fails or times out. The code is stored
    /// before delivery is attempted, so resend throttling still applies afterwards.
    pub async fn request_code(&self, identifier: &Identifier) -> Result<IssueOutcome, Error> {
        let policy = self.policy().await?;
        let now = self.clock.now();
        let record = self.repository.get(identifier).await?;

        match policy.decide_issuance(record.as_ref(), now) {
            IssuanceDecision::Deny(denial) => {
                tracing::info!(
                    identifier = %identifier,
                    reason = ?denial.reason,
                    retry_after = denial.retry_after_seconds(),
                    "Code request denied"
                );
                return Ok(IssueOutcome::Denied(denial));
            }
            IssuanceDecision::Allow {
                release_expired_block,
            } => {
                if release_expired_block {
                    self.repository.reset(identifier).await?;
                    tracing::info!(identifier = %identifier, "Released expired block");
                }
            }
        }

        let code = self.generator.generate();
        self.repository.upsert_issued(identifier, &code, now).await?;
        tracing::debug!(identifier = %identifier, "Verification code stored");

        self.deliver(identifier, &code).await?;
        tracing::info!(identifier = %identifier, "Verification code issued");

        Ok(IssueOutcome::Issued { code })
    }

    /// Check a submitted code.
    ///
    /// A block started by this call is persisted before the denial is returned.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for an empty code, before any store access.
    pub async fn verify_code(
        &self,
        identifier: &Identifier,
        submitted: &str,
    ) -> Result<VerifyOutcome, Error> {
        validate_submitted_code(submitted)?;

        let Some(record) = self.repository.get(identifier).await? else {
            tracing::debug!(identifier = %identifier, "No outstanding code");
            return Ok(VerifyOutcome::Invalid);
        };

        let policy = self.policy().await?;
        let now = self.clock.now();

        match policy.decide_verification(&record, now) {
            VerificationDecision::Deny(denial) => {
                if denial.reason == DenialReason::NewlyBlocked {
                    self.block(identifier, now).await?;
                } else {
                    tracing::info!(
                        identifier = %identifier,
                        reason = ?denial.reason,
                        retry_after = denial.retry_after_seconds(),
                        "Verification denied"
                    );
                }
                return Ok(VerifyOutcome::Denied(denial));
            }
            VerificationDecision::Allow { reset_stale_block } => {
                if reset_stale_block {
                    self.repository.reset(identifier).await?;
                    tracing::info!(identifier = %identifier, "Released expired block");
                }
            }
        }

        if record.matches(submitted) {
            self.repository.delete(identifier).await?;
            tracing::info!(identifier = %identifier, "Verification succeeded");
            return Ok(VerifyOutcome::Verified);
        }

        let Some(hits) = self.repository.increment_hit(identifier, now).await? else {
            return Ok(VerifyOutcome::Invalid);
        };

        match policy.decide_after_failure(hits) {
            FailureDecision::StillOpen { remaining } => {
                tracing::info!(
                    identifier = %identifier,
                    hit_count = hits,
                    remaining = remaining,
                    "Verification failed"
                );
                Ok(VerifyOutcome::Invalid)
            }
            FailureDecision::Block(denial) => {
                self.block(identifier, now).await?;
                Ok(VerifyOutcome::Denied(denial))
            }
        }
    }

    /// Reset counters and any block for `identifier`, keeping the outstanding code.
    ///
    /// # Returns
    ///
    /// `true` if the record was blocked.
    pub async fn clear(&self, identifier: &Identifier) -> Result<bool, Error> {
        let Some(record) = self.repository.get(identifier).await? else {
            return Ok(false);
        };

        self.repository.reset(identifier).await?;
        tracing::info!(identifier = %identifier, was_blocked = record.is_blocked, "Cleared verification throttle");
        Ok(record.is_blocked)
    }

    /// Current throttle state for `identifier`, without side effects.
    pub async fn status(&self, identifier: &Identifier) -> Result<Option<OtpStatus>, Error> {
        let Some(record) = self.repository.get(identifier).await? else {
            return Ok(None);
        };

        let policy = self.policy().await?;
        let retry_after_seconds = match policy.decide_issuance(Some(&record), self.clock.now()) {
            IssuanceDecision::Deny(denial) => denial.retry_after_seconds(),
            IssuanceDecision::Allow { .. } => 0,
        };

        Ok(Some(OtpStatus {
            identifier: record.identifier,
            hit_count: record.hit_count,
            is_blocked: record.is_blocked,
            blocked_at: record.blocked_at,
            issued_at: record.created_at,
            retry_after_seconds,
        }))
    }

    /// Start the background task that releases expired blocks.
    ///
    /// Blocks also expire lazily on the next access, so the task is optional. It
    /// only resets records and never deletes them.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - A watch receiver that signals when to stop the task
    pub fn start_cleanup_task(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let settings = Arc::clone(&self.settings);
        let clock = Arc::clone(&self.clock);

        spawn_block_release_task(
            "otp",
            self.config.cleanup_interval,
            shutdown,
            move || {
                let repository = Arc::clone(&repository);
                let settings = Arc::clone(&settings);
                let clock = Arc::clone(&clock);
                async move {
                    let resolved = ThrottleSettings::resolve_otp(settings.as_ref()).await?;
                    // A window reaching before the earliest representable time has released nothing yet.
                    let Some(before) = clock.now().checked_sub_signed(resolved.temp_block) else {
                        return Ok(0);
                    };
                    repository.release_expired_blocks(before).await
                }
            },
        )
    }

    async fn policy(&self) -> Result<ThrottlePolicy, Error> {
        let settings = ThrottleSettings::resolve_otp(self.settings.as_ref()).await?;
        Ok(ThrottlePolicy::new(settings))
    }

    async fn block(&self, identifier: &Identifier, now: DateTime<Utc>) -> Result<(), Error> {
        self.repository.mark_blocked(identifier, now).await?;
        tracing::warn!(identifier = %identifier, "Verification temporarily blocked");
        Ok(())
    }

    async fn deliver(&self, identifier: &Identifier, code: &str) -> Result<(), Error> {
        let timeout = self.config.delivery_timeout;
        match tokio::time::timeout(timeout, self.gateway.send(identifier, code)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(identifier = %identifier, error = %e, "Code delivery failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(
                    identifier = %identifier,
                    timeout_secs = timeout.as_secs(),
                    "Code delivery timed out"
                );
                Err(DeliveryError::Timeout(timeout.as_secs()).into())
            }
        }
    }
}

//! # Warden
//!
//! Warden issues one-time verification codes over SMS or email, verifies them, and
//! throttles abuse of both the code flow and password logins:
//!
//! - a new code can be requested at most once per resend window
//! - too many wrong codes inside the window start a temporary block
//! - the same rules, with their own settings, gate password logins
//!
//! Blocks expire lazily on the next access. An optional background task also
//! releases them.
//!
//! ## Storage Support
//!
//! - SQLite (feature `sqlite`, enabled by default)
//! - In-memory, for tests and single-process deployments
//!
//! ## Example
//!
//! ```rust,no_run
//! use warden::{Identifier, IssueOutcome, WardenBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warden = WardenBuilder::new()
//!         .with_sqlite("sqlite://warden.db?mode=rwc")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let phone = Identifier::phone("+15550001")?;
//!     match warden.request_otp(&phone).await? {
//!         IssueOutcome::Issued { .. } => println!("code sent"),
//!         IssueOutcome::Denied(denial) => {
//!             println!("try again in {}s", denial.retry_after_seconds())
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod builder;

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use warden_core::{
    clock::{Clock, SystemClock},
    notification::TracingGateway,
    repositories::{LoginAttemptRepositoryAdapter, VerificationRepositoryAdapter},
    settings::StaticSettings,
};

pub use builder::{NoStorage, WardenBuilder, WardenBuilderError, WithStorage};
pub use warden_core::{
    Channel, CodeMode, Denial, DenialReason, Identifier, IssueOutcome, LoginFailure, LoginGate,
    NotificationGateway, OtpServiceConfig, OtpStatus, SettingsProvider, ThrottleSettings,
    VerifyOutcome,
    repositories::{InMemoryRepositoryProvider, RepositoryProvider},
    services::{LoginThrottleService, OtpService},
    settings::EnvSettings,
};

#[cfg(feature = "sqlite")]
pub use warden_storage_sqlite::SqliteRepositoryProvider;

/// Errors that can occur when using Warden.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Malformed input, rejected before any storage access
    #[error("Validation error: {0}")]
    Validation(String),
    /// The code was stored but could not be delivered
    #[error("Delivery error: {0}")]
    Delivery(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// A settings provider failed
    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<warden_core::Error> for WardenError {
    fn from(error: warden_core::Error) -> Self {
        match error {
            warden_core::Error::Validation(e) => WardenError::Validation(e.to_string()),
            warden_core::Error::Delivery(e) => WardenError::Delivery(e.to_string()),
            warden_core::Error::Storage(e) => WardenError::StorageError(e.to_string()),
            warden_core::Error::Settings(e) => WardenError::Settings(e),
        }
    }
}

impl From<warden_core::ValidationError> for WardenError {
    fn from(error: warden_core::ValidationError) -> Self {
        WardenError::Validation(error.to_string())
    }
}

pub type OtpServiceFor<R> = OtpService<VerificationRepositoryAdapter<R>>;
pub type LoginServiceFor<R> = LoginThrottleService<LoginAttemptRepositoryAdapter<R>>;

/// The warden instance: OTP issuance and verification plus login throttling over
/// one storage backend.
///
/// Construct with [`WardenBuilder`] or [`Warden::new`]. Cheap to share behind an
/// `Arc`.
pub struct Warden<R: RepositoryProvider> {
    repositories: Arc<R>,
    otp_service: Arc<OtpServiceFor<R>>,
    login_service: Arc<LoginServiceFor<R>>,
}

impl<R: RepositoryProvider> Warden<R> {
    /// Create a Warden with default settings, random codes, and a gateway that only
    /// logs codes.
    pub fn new(repositories: Arc<R>) -> Self {
        Self::from_parts(
            repositories,
            Arc::new(StaticSettings::new()),
            Arc::new(TracingGateway),
            OtpServiceConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub(crate) fn from_parts(
        repositories: Arc<R>,
        settings: Arc<dyn SettingsProvider>,
        gateway: Arc<dyn NotificationGateway>,
        otp_config: OtpServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cleanup_interval = otp_config.cleanup_interval;

        let otp_service = OtpService::new(
            Arc::new(VerificationRepositoryAdapter::new(repositories.clone())),
            settings.clone(),
            gateway,
            otp_config,
        )
        .with_clock(clock.clone());

        let login_service = LoginThrottleService::new(
            Arc::new(LoginAttemptRepositoryAdapter::new(repositories.clone())),
            settings,
        )
        .with_clock(clock)
        .with_cleanup_interval(cleanup_interval);

        Self {
            repositories,
            otp_service: Arc::new(otp_service),
            login_service: Arc::new(login_service),
        }
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), WardenError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| WardenError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), WardenError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| WardenError::StorageError(e.to_string()))
    }

    pub fn otp(&self) -> &Arc<OtpServiceFor<R>> {
        &self.otp_service
    }

    pub fn login(&self) -> &Arc<LoginServiceFor<R>> {
        &self.login_service
    }

    /// Issue and send a new code, subject to resend throttling and blocks.
    pub async fn request_otp(&self, identifier: &Identifier) -> Result<IssueOutcome, WardenError> {
        Ok(self.otp_service.request_code(identifier).await?)
    }

    /// Check a submitted code. An unknown identifier is reported as `Invalid`.
    pub async fn verify_otp(
        &self,
        identifier: &Identifier,
        code: &str,
    ) -> Result<VerifyOutcome, WardenError> {
        Ok(self.otp_service.verify_code(identifier, code).await?)
    }

    /// Lift any block on `identifier`. Returns whether it was blocked.
    pub async fn clear_otp(&self, identifier: &Identifier) -> Result<bool, WardenError> {
        Ok(self.otp_service.clear(identifier).await?)
    }

    pub async fn otp_status(&self, identifier: &Identifier) -> Result<Option<OtpStatus>, WardenError> {
        Ok(self.otp_service.status(identifier).await?)
    }

    /// Gate a login before checking credentials.
    pub async fn check_login(&self, account: &str) -> Result<LoginGate, WardenError> {
        Ok(self.login_service.check(account).await?)
    }

    pub async fn record_login_failure(&self, account: &str) -> Result<LoginFailure, WardenError> {
        Ok(self.login_service.record_failure(account).await?)
    }

    pub async fn record_login_success(&self, account: &str) -> Result<(), WardenError> {
        Ok(self.login_service.record_success(account).await?)
    }

    /// Lift a login block. Returns whether the account was blocked.
    pub async fn unlock_login(&self, account: &str) -> Result<bool, WardenError> {
        Ok(self.login_service.unlock(account).await?)
    }

    /// Start the block release tasks for both throttles.
    ///
    /// Both tasks stop when `shutdown` changes.
    pub fn start_cleanup_tasks(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            self.otp_service.start_cleanup_task(shutdown.clone()),
            self.login_service.start_cleanup_task(shutdown),
        ]
    }
}

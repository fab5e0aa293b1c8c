//! Builder pattern for constructing Warden instances
//!
//! The builder uses a type-state pattern so that storage must be configured before
//! anything else.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden::{CodeMode, WardenBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warden = WardenBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_code_mode(CodeMode::test())
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     warden.health_check().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use warden_core::{
    clock::{Clock, SystemClock},
    notification::TracingGateway,
    settings::{EnvSettings, StaticSettings},
};

use crate::{
    CodeMode, InMemoryRepositoryProvider, NotificationGateway, OtpServiceConfig,
    RepositoryProvider, SettingsProvider, Warden,
};

/// Errors that can occur when building a Warden instance.
#[derive(Debug, thiserror::Error)]
pub enum WardenBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Marker type indicating no storage has been configured yet.
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

/// A type-safe builder for constructing [`Warden`] instances.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
///
/// # Defaults
///
/// - Settings: built-in defaults (5 hits, 60 s resend window, 600 s block)
/// - Gateway: logs codes instead of sending them
/// - Codes: random, 6 digits
/// - Delivery timeout: 10 seconds
/// - Apply migrations: false
pub struct WardenBuilder<Storage> {
    storage: Storage,
    settings: Arc<dyn SettingsProvider>,
    gateway: Arc<dyn NotificationGateway>,
    otp_config: OtpServiceConfig,
    clock: Arc<dyn Clock>,
    apply_migrations: bool,
}

impl Default for WardenBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl WardenBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            settings: Arc::new(StaticSettings::new()),
            gateway: Arc::new(TracingGateway),
            otp_config: OtpServiceConfig::default(),
            clock: Arc::new(SystemClock),
            apply_migrations: false,
        }
    }

    /// Use any repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> WardenBuilder<WithStorage<R>> {
        WardenBuilder {
            storage: WithStorage { repositories },
            settings: self.settings,
            gateway: self.gateway,
            otp_config: self.otp_config,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }

    /// Keep all state in process memory.
    pub fn with_memory_storage(self) -> WardenBuilder<WithStorage<InMemoryRepositoryProvider>> {
        self.with_repositories(Arc::new(InMemoryRepositoryProvider::new()))
    }
}

#[cfg(feature = "sqlite")]
impl WardenBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<WardenBuilder<WithStorage<crate::SqliteRepositoryProvider>>, WardenBuilderError>
    {
        let pool = sqlx::SqlitePool::connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            WardenBuilderError::StorageConnection(e.to_string())
        })?;

        Ok(self.with_sqlite_pool(pool))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> WardenBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

impl<R: RepositoryProvider> WardenBuilder<WithStorage<R>> {
    /// Read throttle settings from this provider on every operation.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// Read throttle settings from `WARDEN_*` environment variables.
    pub fn with_env_settings(self) -> Self {
        self.with_settings(Arc::new(EnvSettings::new()))
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn NotificationGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Choose between a fixed code (non-production) and random codes.
    pub fn with_code_mode(mut self, code_mode: CodeMode) -> Self {
        self.otp_config.code_mode = code_mode;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.otp_config.delivery_timeout = timeout;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.otp_config.cleanup_interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run migrations as part of [`build`](Self::build).
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    pub async fn build(self) -> Result<Warden<R>, WardenBuilderError> {
        self.validate()?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| WardenBuilderError::Migration(e.to_string()))?;
        }

        Ok(Warden::from_parts(
            self.storage.repositories,
            self.settings,
            self.gateway,
            self.otp_config,
            self.clock,
        ))
    }

    fn validate(&self) -> Result<(), WardenBuilderError> {
        if self.otp_config.delivery_timeout.is_zero() {
            return Err(WardenBuilderError::InvalidConfiguration(
                "Delivery timeout must be greater than zero".to_string(),
            ));
        }

        if self.otp_config.cleanup_interval.is_zero() {
            return Err(WardenBuilderError::InvalidConfiguration(
                "Cleanup interval must be greater than zero".to_string(),
            ));
        }

        match &self.otp_config.code_mode {
            CodeMode::Fixed(code) if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) => {
                Err(WardenBuilderError::InvalidConfiguration(format!(
                    "Fixed code must be numeric, got {code:?}"
                )))
            }
            CodeMode::Random { length } if !(1..=9).contains(length) => {
                Err(WardenBuilderError::InvalidConfiguration(format!(
                    "Code length must be between 1 and 9, got {length}"
                )))
            }
            _ => Ok(()),
        }
    }
}

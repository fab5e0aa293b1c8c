//! Throttle tunables.
//!
//! Settings are read from a [`SettingsProvider`] by key and resolved once per
//! operation into a [`ThrottleSettings`] value. All defaults are declared here.
//!
//! # Example
//!
//! ```rust
//! use warden_core::settings::{StaticSettings, ThrottleSettings, keys};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let settings = StaticSettings::new();
//! settings.set(keys::MAXIMUM_OTP_HIT, "3");
//!
//! let resolved = ThrottleSettings::resolve_otp(&settings).await.unwrap();
//! assert_eq!(resolved.max_hits, 3);
//! assert_eq!(resolved.resend_interval.num_seconds(), 60);
//! # }
//! ```

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;

use crate::Error;

/// Setting keys understood by the throttle.
pub mod keys {
    pub const MAXIMUM_OTP_HIT: &str = "maximum_otp_hit";
    pub const OTP_RESEND_TIME: &str = "otp_resend_time";
    pub const TEMPORARY_BLOCK_TIME: &str = "temporary_block_time";
    pub const MAXIMUM_LOGIN_HIT: &str = "maximum_login_hit";
    pub const TEMPORARY_LOGIN_BLOCK_TIME: &str = "temporary_login_block_time";
    /// Optional. When unset, issued codes do not expire on their own.
    pub const OTP_EXPIRY_TIME: &str = "otp_expiry_time";

    pub const ALL: [&str; 6] = [
        MAXIMUM_OTP_HIT,
        OTP_RESEND_TIME,
        TEMPORARY_BLOCK_TIME,
        MAXIMUM_LOGIN_HIT,
        TEMPORARY_LOGIN_BLOCK_TIME,
        OTP_EXPIRY_TIME,
    ];
}

pub const DEFAULT_MAX_OTP_HITS: u32 = 5;
pub const DEFAULT_RESEND_SECONDS: i64 = 60;
pub const DEFAULT_TEMP_BLOCK_SECONDS: i64 = 600;
pub const DEFAULT_MAX_LOGIN_HITS: u32 = 5;
pub const DEFAULT_TEMP_LOGIN_BLOCK_SECONDS: i64 = 600;

/// Key/value source of tunables, typically backed by a business-settings table.
#[async_trait]
pub trait SettingsProvider: Send + Sync + 'static {
    /// Look up a raw setting value. `Ok(None)` means "not configured".
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
}

/// Resolved tunables for one throttle instance.
///
/// The OTP throttle and the login throttle are both expressed with this struct.
/// For the login throttle the hit window and the block duration are the same value
/// (`temporary_login_block_time`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Failed attempts tolerated before a temporary block.
    pub max_hits: u32,
    /// Minimum gap between two issuances; also the window hits are counted in.
    pub resend_interval: Duration,
    /// How long a temporary block lasts.
    pub temp_block: Duration,
    /// How long an issued code stays valid, if limited.
    pub code_lifetime: Option<Duration>,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self::otp_defaults()
    }
}

impl ThrottleSettings {
    pub fn otp_defaults() -> Self {
        Self {
            max_hits: DEFAULT_MAX_OTP_HITS,
            resend_interval: Duration::seconds(DEFAULT_RESEND_SECONDS),
            temp_block: Duration::seconds(DEFAULT_TEMP_BLOCK_SECONDS),
            code_lifetime: None,
        }
    }

    pub fn login_defaults() -> Self {
        Self {
            max_hits: DEFAULT_MAX_LOGIN_HITS,
            resend_interval: Duration::seconds(DEFAULT_TEMP_LOGIN_BLOCK_SECONDS),
            temp_block: Duration::seconds(DEFAULT_TEMP_LOGIN_BLOCK_SECONDS),
            code_lifetime: None,
        }
    }

    /// Resolve the OTP throttle from a settings provider.
    pub async fn resolve_otp(provider: &dyn SettingsProvider) -> Result<Self, Error> {
        let max_hits = read_count(provider, keys::MAXIMUM_OTP_HIT, DEFAULT_MAX_OTP_HITS).await?;
        let resend_interval =
            read_seconds(provider, keys::OTP_RESEND_TIME, DEFAULT_RESEND_SECONDS).await?;
        let temp_block =
            read_seconds(provider, keys::TEMPORARY_BLOCK_TIME, DEFAULT_TEMP_BLOCK_SECONDS).await?;
        let code_lifetime = read_optional_seconds(provider, keys::OTP_EXPIRY_TIME).await?;

        Ok(Self {
            max_hits,
            resend_interval,
            temp_block,
            code_lifetime,
        })
    }

    /// Resolve the login throttle from a settings provider.
    pub async fn resolve_login(provider: &dyn SettingsProvider) -> Result<Self, Error> {
        let max_hits =
            read_count(provider, keys::MAXIMUM_LOGIN_HIT, DEFAULT_MAX_LOGIN_HITS).await?;
        let temp_block = read_seconds(
            provider,
            keys::TEMPORARY_LOGIN_BLOCK_TIME,
            DEFAULT_TEMP_LOGIN_BLOCK_SECONDS,
        )
        .await?;

        Ok(Self {
            max_hits,
            resend_interval: temp_block,
            temp_block,
            code_lifetime: None,
        })
    }
}

async fn read_count(
    provider: &dyn SettingsProvider,
    key: &str,
    default: u32,
) -> Result<u32, Error> {
    let Some(raw) = provider.get(key).await? else {
        return Ok(default);
    };

    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => {
            tracing::warn!(key = key, value = %raw, default = default, "Ignoring invalid setting");
            Ok(default)
        }
    }
}

async fn read_seconds(
    provider: &dyn SettingsProvider,
    key: &str,
    default: i64,
) -> Result<Duration, Error> {
    Ok(read_optional_seconds(provider, key)
        .await?
        .unwrap_or_else(|| Duration::seconds(default)))
}

/// A window length in whole seconds. Negative values and values too large to
/// represent as a [`Duration`] are ignored.
async fn read_optional_seconds(
    provider: &dyn SettingsProvider,
    key: &str,
) -> Result<Option<Duration>, Error> {
    let Some(raw) = provider.get(key).await? else {
        return Ok(None);
    };

    let window = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|seconds| *seconds >= 0)
        .and_then(Duration::try_seconds);

    match window {
        Some(window) => Ok(Some(window)),
        None => {
            tracing::warn!(key = key, value = %raw, "Ignoring invalid setting");
            Ok(None)
        }
    }
}

/// In-memory settings, adjustable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    values: DashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }
}

/// Settings read from environment variables named `<PREFIX><KEY>` in upper case,
/// e.g. `WARDEN_MAXIMUM_OTP_HIT`.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    prefix: String,
}

impl EnvSettings {
    pub fn new() -> Self {
        Self::with_prefix("WARDEN_")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsProvider for EnvSettings {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(std::env::var(self.var_name(key)).ok())
    }
}

//! Core functionality for the warden project
//!
//! Warden issues one-time verification codes to phone numbers and email addresses,
//! verifies them, and throttles abuse: resends are rate limited, and too many wrong
//! codes (or failed logins) start a temporary block.
//!
//! The crate is split into:
//!
//! - [`policy`]: pure throttle decisions over a record, settings and the current time
//! - [`services`]: [`OtpService`] and [`LoginThrottleService`], which apply decisions
//!   against storage and the notification gateway
//! - [`repositories`]: storage traits plus an in-memory backend
//! - [`settings`], [`notification`], [`code`], [`clock`]: the collaborators the
//!   services are wired with
//!
//! The core never renders user-facing messages. See `warden-axum` for an HTTP layer.

pub mod clock;
pub mod code;
pub mod error;
pub mod identifier;
pub mod notification;
pub mod policy;
pub mod record;
pub mod repositories;
pub mod services;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{CodeGenerator, CodeMode};
pub use error::{DeliveryError, Error, StorageError, ValidationError};
pub use identifier::{Channel, Identifier};
pub use notification::NotificationGateway;
pub use policy::{Denial, DenialReason, ThrottlePolicy};
pub use record::{LoginAttemptRecord, VerificationRecord};
pub use services::{
    IssueOutcome, LoginFailure, LoginGate, LoginThrottleService, OtpService, OtpServiceConfig,
    OtpStatus, VerifyOutcome,
};
pub use settings::{SettingsProvider, ThrottleSettings};

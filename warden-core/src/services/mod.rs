//! Orchestration services.
//!
//! [`OtpService`] issues and verifies one-time codes; [`LoginThrottleService`] gates
//! password logins. Both resolve their settings once per call, ask the
//! [`ThrottlePolicy`](crate::policy::ThrottlePolicy) for a decision, and apply the
//! resulting store mutations before answering.

pub mod login;
pub mod otp;

pub use login::{LoginFailure, LoginGate, LoginThrottleService};
pub use otp::{IssueOutcome, OtpService, OtpServiceConfig, OtpStatus, VerifyOutcome};

use std::future::Future;

use tokio::{sync::watch, task::JoinHandle};

use crate::Error;

/// How often the background sweep releases expired blocks.
pub const DEFAULT_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Periodically run `sweep` until `shutdown` changes.
///
/// Each run returns the number of records released. Failures are logged and the
/// loop continues.
pub(crate) fn spawn_block_release_task<F, Fut>(
    name: &'static str,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64, Error>> + Send,
{
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    match sweep().await {
                        Ok(count) if count > 0 => {
                            tracing::info!(task = name, count = count, "Released expired blocks");
                        }
                        Err(e) => {
                            tracing::warn!(task = name, error = %e, "Failed to release expired blocks");
                        }
                        _ => {}
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!(task = name, "Shutting down block release task");
                    break;
                }
            }
        }
    })
}

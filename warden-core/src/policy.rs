//! Throttle decisions.
//!
//! [`ThrottlePolicy`] is pure: given a record, the resolved settings and the current
//! time it returns a decision value and never touches storage. The services apply
//! whatever side effect a decision calls for (resetting a stale block, marking a new
//! block) before answering the caller.
//!
//! The same policy drives both the OTP throttle and the login throttle; the two
//! differ only in the [`ThrottleSettings`] they are instantiated with.
//!
//! # Verification order
//!
//! 1. An active block (`now - blocked_at < temp_block`) denies with the remaining time.
//! 2. A block whose record has been idle for a full resend window is reset.
//! 3. A record at or over `max_hits` inside the resend window becomes blocked.
//! 4. A code older than its lifetime (when one is configured) is expired.
//! 5. Otherwise the caller may compare codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{record::ThrottleState, settings::ThrottleSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// A new code was requested before the resend window elapsed.
    RateLimited,
    /// A temporary block is in force.
    BlockActive,
    /// This request crossed the hit threshold and started a block.
    NewlyBlocked,
    /// The outstanding code outlived its configured lifetime.
    Expired,
}

impl DenialReason {
    pub fn is_block(&self) -> bool {
        matches!(self, DenialReason::BlockActive | DenialReason::NewlyBlocked)
    }
}

/// Why a request was refused and how long the caller should wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    pub retry_after: Duration,
}

impl Denial {
    pub fn new(reason: DenialReason, retry_after: Duration) -> Self {
        Self {
            reason,
            retry_after: retry_after.max(Duration::zero()),
        }
    }

    /// Remaining wait in whole seconds, rounded up so "0 seconds" is never shown
    /// while the caller would still be refused.
    pub fn retry_after_seconds(&self) -> i64 {
        let millis = self.retry_after.num_milliseconds();
        (millis + 999).div_euclid(1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceDecision {
    /// A new code may be issued. When `release_expired_block` is set the record's
    /// expired block must be reset first.
    Allow { release_expired_block: bool },
    Deny(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDecision {
    /// The caller may compare codes. When `reset_stale_block` is set the record's
    /// counters and block must be reset first.
    Allow { reset_stale_block: bool },
    Deny(Denial),
}

/// Outcome of a failed attempt, judged on the count after incrementing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    StillOpen { remaining: u32 },
    Block(Denial),
}

#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    settings: ThrottleSettings,
}

impl ThrottlePolicy {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// Decide whether a new code may be issued.
    pub fn decide_issuance<S: ThrottleState>(
        &self,
        record: Option<&S>,
        now: DateTime<Utc>,
    ) -> IssuanceDecision {
        let Some(record) = record else {
            return IssuanceDecision::Allow {
                release_expired_block: false,
            };
        };

        let mut release_expired_block = false;
        if record.is_blocked() {
            if let Some(remaining) = self.remaining_block(record, now) {
                return IssuanceDecision::Deny(Denial::new(DenialReason::BlockActive, remaining));
            }
            release_expired_block = true;
        }

        let elapsed = now - record.updated_at();
        if elapsed < self.settings.resend_interval {
            return IssuanceDecision::Deny(Denial::new(
                DenialReason::RateLimited,
                remaining(self.settings.resend_interval, elapsed),
            ));
        }

        IssuanceDecision::Allow {
            release_expired_block,
        }
    }

    /// Decide whether a submitted code may be compared.
    pub fn decide_verification<S: ThrottleState>(
        &self,
        record: &S,
        now: DateTime<Utc>,
    ) -> VerificationDecision {
        if record.is_blocked() {
            if let Some(remaining) = self.remaining_block(record, now) {
                return VerificationDecision::Deny(Denial::new(
                    DenialReason::BlockActive,
                    remaining,
                ));
            }
        }

        let since_update = now - record.updated_at();
        let mut blocked = record.is_blocked();
        let mut hits = record.hit_count();
        let mut reset_stale_block = false;

        if blocked && since_update >= self.settings.resend_interval {
            reset_stale_block = true;
            blocked = false;
            hits = 0;
        }

        if !blocked && hits >= self.settings.max_hits && since_update < self.settings.resend_interval
        {
            return VerificationDecision::Deny(Denial::new(
                DenialReason::NewlyBlocked,
                self.settings.temp_block,
            ));
        }

        if let (Some(lifetime), Some(issued_at)) = (self.settings.code_lifetime, record.issued_at())
        {
            if now - issued_at >= lifetime {
                return VerificationDecision::Deny(Denial::new(
                    DenialReason::Expired,
                    Duration::zero(),
                ));
            }
        }

        VerificationDecision::Allow { reset_stale_block }
    }

    /// Judge a failed attempt by the hit count it produced.
    pub fn decide_after_failure(&self, hit_count: u32) -> FailureDecision {
        if hit_count >= self.settings.max_hits {
            FailureDecision::Block(Denial::new(
                DenialReason::NewlyBlocked,
                self.settings.temp_block,
            ))
        } else {
            FailureDecision::StillOpen {
                remaining: self.settings.max_hits - hit_count,
            }
        }
    }

    /// Time left on an active block, or `None` once it has run out.
    fn remaining_block<S: ThrottleState>(&self, record: &S, now: DateTime<Utc>) -> Option<Duration> {
        // A blocked record without a start time is treated as blocked at its last update.
        let started = record.blocked_at().unwrap_or_else(|| record.updated_at());
        let elapsed = now - started;
        (elapsed < self.settings.temp_block).then(|| remaining(self.settings.temp_block, elapsed))
    }
}

/// `window - elapsed`, saturating at `window` when `elapsed` is negative and the
/// difference is not representable.
fn remaining(window: Duration, elapsed: Duration) -> Duration {
    window.checked_sub(&elapsed).unwrap_or(window)
}

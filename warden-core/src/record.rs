//! Persisted throttle state.
//!
//! [`VerificationRecord`] tracks one outstanding OTP per identifier; [`LoginAttemptRecord`]
//! tracks failed logins per account. Both expose their counters through
//! [`ThrottleState`], which is all the policy needs to see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// The counters and timestamps the throttle policy reasons about.
pub trait ThrottleState {
    fn hit_count(&self) -> u32;
    fn is_blocked(&self) -> bool;
    fn blocked_at(&self) -> Option<DateTime<Utc>>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// When the guarded secret was issued, for records that carry one.
    fn issued_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub identifier: Identifier,
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hit_count: u32,
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    /// A freshly issued record with clean counters.
    pub fn issued(identifier: Identifier, code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identifier,
            code: Some(code.into()),
            created_at: now,
            updated_at: now,
            hit_count: 0,
            is_blocked: false,
            blocked_at: None,
        }
    }

    /// Exact comparison against the stored code. A missing code never matches.
    pub fn matches(&self, submitted: &str) -> bool {
        self.code.as_deref() == Some(submitted)
    }

    /// Clear counters and block state in place.
    pub fn clear_block(&mut self) {
        self.hit_count = 0;
        self.is_blocked = false;
        self.blocked_at = None;
    }
}

impl ThrottleState for VerificationRecord {
    fn hit_count(&self) -> u32 {
        self.hit_count
    }

    fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    fn blocked_at(&self) -> Option<DateTime<Utc>> {
        self.blocked_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn issued_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttemptRecord {
    pub account: String,
    pub login_hit_count: u32,
    pub is_temp_blocked: bool,
    pub temp_block_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LoginAttemptRecord {
    pub fn new(account: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            account: account.into(),
            login_hit_count: 0,
            is_temp_blocked: false,
            temp_block_time: None,
            updated_at: now,
        }
    }

    pub fn clear_block(&mut self) {
        self.login_hit_count = 0;
        self.is_temp_blocked = false;
        self.temp_block_time = None;
    }
}

impl ThrottleState for LoginAttemptRecord {
    fn hit_count(&self) -> u32 {
        self.login_hit_count
    }

    fn is_blocked(&self) -> bool {
        self.is_temp_blocked
    }

    fn blocked_at(&self) -> Option<DateTime<Utc>> {
        self.temp_block_time
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_record_has_clean_counters() {
        let id = Identifier::phone("+15550001").unwrap();
        let now = Utc::now();
        let record = VerificationRecord::issued(id, "123456", now);

        assert_eq!(record.hit_count, 0);
        assert!(!record.is_blocked);
        assert!(record.blocked_at.is_none());
        assert_eq!(record.created_at, now);
        assert_eq!(record.updated_at, now);
    }

    #[test]
    fn test_matches_is_exact() {
        let id = Identifier::phone("+15550001").unwrap();
        let mut record = VerificationRecord::issued(id, "123456", Utc::now());

        assert!(record.matches("123456"));
        assert!(!record.matches(" 123456"));
        assert!(!record.matches("12345"));

        record.code = None;
        assert!(!record.matches(""));
        assert!(!record.matches("123456"));
    }

    #[test]
    fn test_record_serializes_with_channel() {
        let id = Identifier::email("user@example.com").unwrap();
        let record = VerificationRecord::issued(id, "123456", Utc::now());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["identifier"]["channel"], "email");
        assert_eq!(json["hit_count"], 0);
    }

    #[test]
    fn test_login_record_throttle_state() {
        let now = Utc::now();
        let mut record = LoginAttemptRecord::new("acct-1", now);
        record.login_hit_count = 5;
        record.is_temp_blocked = true;
        record.temp_block_time = Some(now);

        assert_eq!(ThrottleState::hit_count(&record), 5);
        assert!(ThrottleState::is_blocked(&record));

        record.clear_block();
        assert_eq!(record.login_hit_count, 0);
        assert!(record.temp_block_time.is_none());
    }
}

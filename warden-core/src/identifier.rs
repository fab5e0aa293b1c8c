//! Identifiers that verification codes are bound to.
//!
//! An [`Identifier`] pairs a delivery [`Channel`] with the phone number or email
//! address it targets. Phone and email identifiers live in separate namespaces, so
//! the same string under two channels refers to two independent records.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Practical subset of RFC 5322, loaded once and reused.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// E.164-style phone numbers: optional leading `+`, no leading zero, 7 to 15 digits.
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{6,14}$").expect("Invalid phone regex pattern"));

/// The channel a code is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Phone,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Phone => "phone",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phone" | "sms" => Ok(Channel::Phone),
            "email" | "mail" => Ok(Channel::Email),
            other => Err(ValidationError::InvalidChannel(other.to_string())),
        }
    }
}

/// A validated phone number or email address, tagged with its channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    channel: Channel,
    value: String,
}

impl Identifier {
    /// Validate and wrap a phone number.
    ///
    /// Surrounding whitespace is ignored; anything else that does not look like an
    /// E.164 number is rejected.
    pub fn phone(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::MissingField(
                "Phone number is required".to_string(),
            ));
        }

        if !PHONE_REGEX.is_match(value) {
            return Err(ValidationError::InvalidPhone(value.to_string()));
        }

        Ok(Self {
            channel: Channel::Phone,
            value: value.to_string(),
        })
    }

    /// Validate and wrap an email address. Addresses are compared case-insensitively.
    pub fn email(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::MissingField("Email is required".to_string()));
        }

        if value.len() > 254 || !EMAIL_REGEX.is_match(value) {
            return Err(ValidationError::InvalidEmail(value.to_string()));
        }

        Ok(Self {
            channel: Channel::Email,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Validate a raw value for the given channel.
    pub fn parse(channel: Channel, value: &str) -> Result<Self, ValidationError> {
        match channel {
            Channel::Phone => Self::phone(value),
            Channel::Email => Self::email(value),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.value)
    }
}

/// Reject an empty submitted code before it reaches the store.
///
/// Only emptiness is checked. Malformed codes are mismatches and count as hits.
pub fn validate_submitted_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::MissingField("Code is required".to_string()));
    }
    Ok(())
}

use serde::{Deserialize, Serialize};
use warden::{Channel, Identifier};
use warden_core::{ValidationError, error::utilities::RequiredFieldExt};

/// Ask for a code. Exactly one of `phone` or `email` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtpRequest {
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl OtpRequest {
    pub fn identifier(&self) -> Result<Identifier, ValidationError> {
        resolve_identifier(self.phone.as_deref(), self.email.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub code: Option<String>,
}

impl VerifyOtpRequest {
    pub fn identifier(&self) -> Result<Identifier, ValidationError> {
        resolve_identifier(self.phone.as_deref(), self.email.as_deref())
    }

    pub fn code(&self) -> Result<&str, ValidationError> {
        self.code.as_deref().require_field("Code")
    }
}

fn resolve_identifier(
    phone: Option<&str>,
    email: Option<&str>,
) -> Result<Identifier, ValidationError> {
    match (phone, email) {
        (Some(_), Some(_)) => Err(ValidationError::InvalidChannel(
            "Provide either phone or email, not both".to_string(),
        )),
        (Some(phone), None) => Identifier::phone(phone),
        (None, email) => Identifier::email(email.require_field("Phone or email")?),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpSentResponse {
    pub message: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpVerifiedResponse {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Body of every error response: `{ "errors": [{ "code", "message" }] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

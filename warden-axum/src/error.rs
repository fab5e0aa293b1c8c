use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use warden::{Denial, DenialReason, WardenError};
use warden_core::ValidationError;

use crate::types::{ErrorDetail, ErrorResponse};

/// Which throttle produced a denial. Selects the error code family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleScope {
    Otp,
    Login,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request denied: {reason:?}")]
    Denied {
        scope: ThrottleScope,
        reason: DenialReason,
        retry_after_seconds: i64,
    },

    #[error("Code not matched")]
    InvalidCode,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn otp_denied(denial: Denial) -> Self {
        Self::denied(ThrottleScope::Otp, denial)
    }

    /// Render a login throttle denial, for use in an application's own login handler.
    pub fn login_denied(denial: Denial) -> Self {
        Self::denied(ThrottleScope::Login, denial)
    }

    fn denied(scope: ThrottleScope, denial: Denial) -> Self {
        ApiError::Denied {
            scope,
            reason: denial.reason,
            retry_after_seconds: denial.retry_after_seconds(),
        }
    }

    /// The machine-readable code carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Denied { scope, reason, .. } => match (scope, reason) {
                (ThrottleScope::Otp, DenialReason::RateLimited) => "otp",
                (ThrottleScope::Otp, DenialReason::BlockActive) => "otp_block_time",
                (ThrottleScope::Otp, DenialReason::NewlyBlocked) => "otp_temp_blocked",
                (ThrottleScope::Otp, DenialReason::Expired) => "token",
                (ThrottleScope::Login, DenialReason::NewlyBlocked) => "login_temp_blocked",
                (ThrottleScope::Login, _) => "login_block_time",
            },
            ApiError::InvalidCode => "token",
            ApiError::BadRequest(_) => "validation",
            ApiError::DeliveryFailed(_) => "delivery",
            ApiError::InternalError(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Denied {
                reason: DenialReason::Expired,
                ..
            } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Denied { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCode => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The human-readable message carried in the response body.
    pub fn message(&self) -> String {
        match self {
            ApiError::Denied {
                scope,
                reason,
                retry_after_seconds,
            } => {
                let wait = humanize_duration(*retry_after_seconds);
                match (scope, reason) {
                    (ThrottleScope::Otp, DenialReason::RateLimited) => {
                        format!("A code was sent recently, please try again after {wait}")
                    }
                    (ThrottleScope::Otp, DenialReason::Expired) => {
                        "The code has expired, please request a new one".to_string()
                    }
                    (ThrottleScope::Otp, DenialReason::NewlyBlocked) => {
                        format!("Too many wrong codes, please try again after {wait}")
                    }
                    (ThrottleScope::Otp, _) => {
                        format!("Verification is temporarily blocked, please try again after {wait}")
                    }
                    (ThrottleScope::Login, DenialReason::NewlyBlocked) => {
                        format!("Too many failed logins, please try again after {wait}")
                    }
                    (ThrottleScope::Login, _) => {
                        format!("Login is temporarily blocked, please try again after {wait}")
                    }
                }
            }
            ApiError::InvalidCode => "Code not matched".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::DeliveryFailed(_) => {
                "The code could not be delivered, please request a new one later".to_string()
            }
            ApiError::InternalError(_) => "Internal server error".to_string(),
        }
    }
}

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::Validation(msg) => ApiError::BadRequest(msg),
            WardenError::Delivery(msg) => ApiError::DeliveryFailed(msg),
            WardenError::StorageError(msg) | WardenError::Settings(msg) => {
                ApiError::InternalError(msg)
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::InternalError(msg) => tracing::error!(error = %msg, "Request failed"),
            ApiError::DeliveryFailed(msg) => tracing::warn!(error = %msg, "Code delivery failed"),
            _ => {}
        }

        let status = self.status();
        let body = Json(ErrorResponse {
            errors: vec![ErrorDetail {
                code: self.code().to_string(),
                message: self.message(),
            }],
        });

        match self {
            ApiError::Denied {
                retry_after_seconds,
                ..
            } if retry_after_seconds > 0 => (
                status,
                [(header::RETRY_AFTER, retry_after_seconds.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Spell out a wait in hours, minutes and seconds, e.g. "9 minutes 59 seconds".
pub fn humanize_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "a moment".to_string();
    }

    let parts = [
        (seconds / 3600, "hour"),
        (seconds % 3600 / 60, "minute"),
        (seconds % 60, "second"),
    ];

    parts
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value == 1 {
                format!("1 {unit}")
            } else {
                format!("{value} {unit}s")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

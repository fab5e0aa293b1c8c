pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Settings error: {0}")]
    Settings(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid verification code: {0}")]
    InvalidCode(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failure to hand a code to the SMS or email provider.
///
/// A delivery failure never rolls back the issued code: the record stays persisted
/// so resend throttling still applies to the next request.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Provider rejected the message: {0}")]
    Rejected(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Delivery timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_delivery_error(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

use crate::{
    Error,
    error::{StorageError, ValidationError},
};

/// Extension trait for Result types to simplify database error mapping
///
/// Storage backends use this to turn driver errors into [`StorageError::Database`]
/// without repeating the conversion at every query.
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to reset record")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a warden storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a warden storage error with additional context
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(format!("{context}: {e}"))))
    }
}

/// Extension trait for Option types to simplify required field validation
///
/// # Example
///
/// ```rust
/// use warden_core::error::utilities::RequiredFieldExt;
///
/// let code: Option<&str> = Some("123456");
/// assert_eq!(code.require_field("Code").unwrap(), "123456");
/// ```
pub trait RequiredFieldExt<T> {
    /// Convert None to a ValidationError::MissingField
    fn require_field(self, field_name: &str) -> Result<T, ValidationError>;
}

impl<T> RequiredFieldExt<T> for Option<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError> {
        self.ok_or_else(|| ValidationError::MissingField(format!("{field_name} is required")))
    }
}

//! # Warden Axum Integration
//!
//! Axum routes for requesting and verifying one-time codes. Throttle denials are
//! returned as `429` responses whose body carries a machine-readable code and a
//! humanized wait:
//!
//! ```json
//! { "errors": [{ "code": "otp_block_time", "message": "Verification is temporarily blocked, please try again after 9 minutes 59 seconds" }] }
//! ```
//!
//! ## Routes
//!
//! - `POST /otp/request` with `{ "phone": "+15550001" }` or `{ "email": "..." }`
//! - `POST /otp/verify` with the same target plus `"code"`
//! - `GET /health`
//!
//! Login throttling stays in the application's own login handler; use
//! [`ApiError::login_denied`] to render its denials in the same shape.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use warden::WardenBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warden = WardenBuilder::new().with_memory_storage().build().await?;
//!
//!     let app = Router::new().nest("/auth", warden_axum::routes(Arc::new(warden)));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod routes;
mod types;

pub use error::{ApiError, Result, ThrottleScope, humanize_duration};
pub use routes::{WardenState, create_router};
pub use types::{
    ErrorDetail, ErrorResponse, HealthResponse, OtpRequest, OtpSentResponse,
    OtpVerifiedResponse, VerifyOtpRequest,
};

use std::sync::Arc;

use axum::Router;
use warden::{RepositoryProvider, Warden};

/// Create the OTP routes, ready to be nested at any path (e.g. "/auth").
pub fn routes<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    create_router(warden)
}

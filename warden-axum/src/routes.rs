use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use warden::{IssueOutcome, RepositoryProvider, VerifyOutcome, Warden};

use crate::{
    error::{ApiError, Result},
    types::*,
};

pub struct WardenState<R: RepositoryProvider> {
    pub warden: Arc<Warden<R>>,
}

impl<R: RepositoryProvider> Clone for WardenState<R> {
    fn clone(&self) -> Self {
        Self {
            warden: self.warden.clone(),
        }
    }
}

pub fn create_router<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    let state = WardenState { warden };

    Router::new()
        .route("/health", get(health_handler))
        .route("/otp/request", post(request_otp_handler))
        .route("/otp/verify", post(verify_otp_handler))
        .with_state(state)
}

async fn health_handler<R>(State(state): State<WardenState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn request_otp_handler<R>(
    State(state): State<WardenState<R>>,
    payload: std::result::Result<Json<OtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let Json(payload) = payload?;
    let identifier = payload.identifier()?;

    match state.warden.request_otp(&identifier).await? {
        IssueOutcome::Issued { .. } => Ok((
            StatusCode::ACCEPTED,
            Json(OtpSentResponse {
                message: "Verification code sent".to_string(),
                channel: identifier.channel(),
            }),
        )),
        IssueOutcome::Denied(denial) => Err(ApiError::otp_denied(denial)),
    }
}

async fn verify_otp_handler<R>(
    State(state): State<WardenState<R>>,
    payload: std::result::Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let Json(payload) = payload?;
    let identifier = payload.identifier()?;
    let code = payload.code()?;

    match state.warden.verify_otp(&identifier, code).await? {
        VerifyOutcome::Verified => Ok(Json(OtpVerifiedResponse { verified: true })),
        VerifyOutcome::Denied(denial) => Err(ApiError::otp_denied(denial)),
        VerifyOutcome::Invalid => Err(ApiError::InvalidCode),
    }
}

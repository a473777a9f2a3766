//! Account endpoints.
//!
//! Every response here is worded the same whether or not an account exists
//! for the address or token presented.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use folio_core::{RateLimitAction, SubjectId};
use serde::{Deserialize, Serialize};

use crate::constants::GENERIC_ACCEPTED_MESSAGE;
use crate::error::ApiResult;
use crate::extractors::ClientIp;
use crate::services::{AccountService, AuthenticatedSubject};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn accepted() -> Self {
        Self {
            message: GENERIC_ACCEPTED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectResponse {
    pub subject_id: SubjectId,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/v1/auth/register
async fn register(
    State(accounts): State<Arc<AccountService>>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    accounts.register(&req.email, &req.password).await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::accepted())))
}

/// POST /api/v1/auth/verify-email
async fn verify_email(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<SubjectResponse>> {
    state
        .rate_limiter
        .enforce(RateLimitAction::VerifyEmail, &client.as_identifier())
        .await?;
    let subject_id = state.accounts.verify_email(&req.token).await?;
    Ok(Json(SubjectResponse { subject_id }))
}

/// POST /api/v1/auth/verify-email/resend
async fn resend_verification(
    State(accounts): State<Arc<AccountService>>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    accounts.request_email_verification(&req.email).await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::accepted())))
}

/// POST /api/v1/auth/password/forgot
async fn forgot_password(
    State(accounts): State<Arc<AccountService>>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    accounts.request_password_reset(&req.email).await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::accepted())))
}

/// POST /api/v1/auth/password/reset
async fn reset_password(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .rate_limiter
        .enforce(RateLimitAction::ResetPassword, &client.as_identifier())
        .await?;
    state
        .accounts
        .reset_password(&req.token, &req.password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// POST /api/v1/auth/login
async fn login(
    State(accounts): State<Arc<AccountService>>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<AuthenticatedSubject>> {
    let subject = accounts.authenticate(&req.email, &req.password).await?;
    Ok(Json(subject))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email", post(verify_email))
        .route("/verify-email/resend", post(resend_verification))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/login", post(login))
}

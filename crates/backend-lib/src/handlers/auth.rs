// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Registration, login, token and password-reset endpoints under `/api/auth`.
use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use scholarflow_common::{
    ApiResponse, LoginRequest, LogoutRequest, PasswordResetConfirmRequest, PasswordResetRequest, RefreshRequest,
    RegisterRequest, VerifyEmailRequest,
};

use super::{envelope, ApiJson};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::AppState;

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.register(request).await?;
    let message = if response.email_verified {
        "Registration successful."
    } else {
        "Registration successful. Please check your email to verify your account."
    };
    Ok((StatusCode::CREATED, envelope(response, message)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.login(request).await?;
    Ok(envelope(response, "Login successful."))
}

/// Revokes the bearer token; a `{refresh}` body revokes that token as well
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice::<LogoutRequest>(&body).map_err(|e| AppError::field("body", e.to_string()))?
    };

    state.auth.logout(&user.claims, request.refresh.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.auth.refresh(request).await?;
    Ok(envelope(pair, "Token refreshed."))
}

pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let validation = state.auth.validate_token(&user.claims, &user.account).await;
    Ok(envelope(validation, "Token is valid."))
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.verify_email(request).await?;
    Ok(envelope(profile, "Email verified successfully."))
}

pub async fn send_verification(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let message = state.auth.resend_verification(&user.account).await?;
    Ok(Json(ApiResponse::message(message)))
}

pub async fn verification_status(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let status = state.auth.verification_status(&user.account).await;
    Ok(envelope(status, "Verification status retrieved."))
}

/// Same answer whether or not the email belongs to an account
pub async fn password_reset(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_password_reset(request).await?;
    Ok(Json(ApiResponse::message(
        "If an account exists for this email, a password reset link has been sent.",
    )))
}

pub async fn password_reset_confirm(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.confirm_password_reset(request).await?;
    Ok(Json(ApiResponse::message(
        "Password has been reset. Please log in with your new password.",
    )))
}

// ============================
// crates/backend-lib/src/handlers/profile.rs
// ============================
//! `GET/PUT/PATCH /api/profile/`
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use scholarflow_common::ProfileUpdateRequest;

use super::{envelope, ApiJson};
use crate::accounts::{profile_patch, UpdateMode};
use crate::error::AppError;
use crate::middleware::ActiveUser;
use crate::AppState;

pub async fn get_profile(ActiveUser(user): ActiveUser) -> impl IntoResponse {
    envelope(user.account.profile(), "Profile retrieved.")
}

pub async fn replace_profile(
    State(state): State<Arc<AppState>>,
    user: ActiveUser,
    ApiJson(request): ApiJson<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    update(&state, user, request, UpdateMode::Replace).await
}

pub async fn patch_profile(
    State(state): State<Arc<AppState>>,
    user: ActiveUser,
    ApiJson(request): ApiJson<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    update(&state, user, request, UpdateMode::Partial).await
}

async fn update(
    state: &AppState,
    ActiveUser(user): ActiveUser,
    request: ProfileUpdateRequest,
    mode: UpdateMode,
) -> Result<impl IntoResponse, AppError> {
    // Reject bad profile fields before touching the password
    let patch = profile_patch(&request, mode)?;

    let mut account = user.account;
    let mut message = "Profile updated.";
    if let Some(new_password) = request.new_password.as_deref() {
        let current = request
            .current_password
            .as_deref()
            .ok_or_else(|| AppError::field("current_password", "This field is required."))?;
        account = state.auth.change_password(&account, current, new_password).await?;
        message = "Profile updated. Please log in again with your new password.";
    }

    if !patch.is_empty() {
        account = state.accounts.update(account.id, &patch).await?;
    }

    tracing::info!(user_id = account.id, ?mode, "profile updated");
    Ok(envelope(account.profile(), message))
}

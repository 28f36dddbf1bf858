// ============================
// crates/backend-lib/src/handlers/admin.rs
// ============================
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use scholarflow_common::{AccountId, AccountStatusRequest};

use super::{envelope, ApiJson};
use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::AppState;

/// Suspend or reactivate an account
pub async fn set_account_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<AccountId>,
    ApiJson(request): ApiJson<AccountStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.account.id && !request.is_active {
        return Err(AppError::InvalidInput("administrators cannot suspend their own account".to_string()));
    }

    let account = state.auth.set_account_active(id, request.is_active).await?;
    tracing::info!(admin = admin.account.id, target = id, active = request.is_active, "account status set");

    let message = if account.is_active {
        "Account activated."
    } else {
        "Account suspended."
    };
    Ok(envelope(account.profile(), message))
}

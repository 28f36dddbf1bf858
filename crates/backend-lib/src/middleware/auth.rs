//! Bearer token extractors.
//!
//! Every extractor re-loads the account, so suspensions and verification
//! take effect on the next request rather than at token expiry.
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::auth::Claims;
use crate::error::AppError;
use crate::models::Account;
use crate::AppState;

/// Any holder of a valid access token, including pending accounts
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
    pub account: Account,
}

/// A holder of a valid access token whose account is active
#[derive(Debug, Clone)]
pub struct ActiveUser(pub CurrentUser);

/// An active administrator
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;

    let (scheme, token) = header.split_once(' ').ok_or(AppError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Unauthenticated);
    }
    Ok(token.trim())
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let (claims, account) = state.auth.authenticate(token).await?;
        Ok(CurrentUser { claims, account })
    }
}

impl FromRequestParts<Arc<AppState>> for ActiveUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.account.is_active {
            return Err(AppError::AccountInactive);
        }
        Ok(ActiveUser(user))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let ActiveUser(user) = ActiveUser::from_request_parts(parts, state).await?;
        if !user.account.is_admin() {
            tracing::warn!(user_id = user.account.id, "administrator route refused");
            return Err(AppError::PermissionDenied);
        }
        Ok(AdminUser(user))
    }
}

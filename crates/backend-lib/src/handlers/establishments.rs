// ============================
// crates/backend-lib/src/handlers/establishments.rs
// ============================
//! Establishment CRUD. Reads need an active account, mutations an administrator.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use scholarflow_common::{CreateEstablishmentRequest, EstablishmentView, UpdateEstablishmentRequest};

use super::{envelope, ApiJson};
use crate::accounts::UpdateMode;
use crate::error::AppError;
use crate::middleware::{ActiveUser, AdminUser};
use crate::AppState;

pub async fn list(State(state): State<Arc<AppState>>, _user: ActiveUser) -> Result<impl IntoResponse, AppError> {
    let views: Vec<EstablishmentView> = state.establishments.list().await?.iter().map(|e| e.view()).collect();
    Ok(envelope(views, "Establishments retrieved."))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<CreateEstablishmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let establishment = state.establishments.create(request).await?;
    tracing::info!(admin = admin.account.id, code = %establishment.code, "establishment created");
    Ok((StatusCode::CREATED, envelope(establishment.view(), "Establishment created.")))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    _user: ActiveUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let establishment = state.establishments.get(&code).await?;
    Ok(envelope(establishment.view(), "Establishment retrieved."))
}

pub async fn replace(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(code): Path<String>,
    ApiJson(request): ApiJson<UpdateEstablishmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let establishment = state.establishments.update(&code, request, UpdateMode::Replace).await?;
    Ok(envelope(establishment.view(), "Establishment updated."))
}

pub async fn patch(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(code): Path<String>,
    ApiJson(request): ApiJson<UpdateEstablishmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let establishment = state.establishments.update(&code, request, UpdateMode::Partial).await?;
    Ok(envelope(establishment.view(), "Establishment updated."))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    state.establishments.delete(&code).await?;
    tracing::info!(admin = admin.account.id, %code, "establishment deleted");
    Ok(StatusCode::NO_CONTENT)
}

//! Establishment directory: CRUD keyed by school code.
use std::sync::Arc;

use scholarflow_common::{CreateEstablishmentRequest, EstablishmentStatus, UpdateEstablishmentRequest};

use crate::accounts::UpdateMode;
use crate::error::AppError;
use crate::models::{Establishment, EstablishmentPatch};
use crate::storage::Storage;
use crate::validation::{validate_establishment_code, validate_optional_text, validate_required_text, Validator};

#[derive(Clone)]
pub struct EstablishmentDirectory {
    storage: Arc<dyn Storage>,
}

impl EstablishmentDirectory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn list(&self) -> Result<Vec<Establishment>, AppError> {
        self.storage.list_establishments().await
    }

    pub async fn get(&self, code: &str) -> Result<Establishment, AppError> {
        self.storage
            .establishment(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("establishment {code}")))
    }

    #[tracing::instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: CreateEstablishmentRequest) -> Result<Establishment, AppError> {
        let mut v = Validator::new();
        let code = v.check("code", validate_establishment_code(&request.code));
        let name = v.check("name", validate_required_text(&request.name));
        let address = v.check("address", validate_optional_text(request.address.as_deref()));
        v.finish()?;

        let (Some(code), Some(name), Some(address)) = (code, name, address) else {
            return Err(AppError::Internal("validated fields missing".to_string()));
        };

        let establishment = self
            .storage
            .insert_establishment(Establishment {
                code,
                name,
                address,
                created_at: request.created_at,
                status: request.status.unwrap_or_default(),
            })
            .await?;
        tracing::info!("establishment created");
        Ok(establishment)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update(
        &self,
        code: &str,
        request: UpdateEstablishmentRequest,
        mode: UpdateMode,
    ) -> Result<Establishment, AppError> {
        let replace = matches!(mode, UpdateMode::Replace);
        let mut patch = EstablishmentPatch::default();

        let mut v = Validator::new();
        match request.name {
            Some(name) => patch.name = v.check("name", validate_required_text(&name)),
            None if replace => v.push("name", "This field is required."),
            None => {},
        }
        match request.address {
            Some(address) => patch.address = v.check("address", validate_optional_text(Some(&address))),
            None if replace => patch.address = Some(None),
            None => {},
        }
        v.finish()?;

        patch.created_at = match request.created_at {
            Some(date) => Some(Some(date)),
            None => replace.then_some(None),
        };
        patch.status = request.status.or_else(|| replace.then(EstablishmentStatus::default));

        self.storage.update_establishment(code, &patch).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, code: &str) -> Result<(), AppError> {
        if self.storage.delete_establishment(code).await? {
            tracing::info!("establishment deleted");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("establishment {code}")))
        }
    }
}

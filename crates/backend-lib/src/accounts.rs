//! Account directory: creation with generated matricules, lookups and
//! profile edits.
use std::sync::Arc;

use scholarflow_common::{AccountId, ProfileUpdateRequest, Role};

use crate::auth::token_generator::{generate_matricule, MAX_MATRICULE_ATTEMPTS};
use crate::error::AppError;
use crate::models::{Account, AccountPatch, NewAccount};
use crate::storage::Storage;
use crate::validation::{validate_name, validate_optional_text, validate_phone, Validator};

/// Fields supplied by the caller when creating an account
#[derive(Debug, Clone)]
pub struct AccountCandidate {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
}

/// How a profile update treats fields absent from the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// `PATCH`: leave absent fields untouched
    Partial,
    /// `PUT`: clear absent fields
    Replace,
}

#[derive(Clone)]
pub struct AccountDirectory {
    storage: Arc<dyn Storage>,
}

impl AccountDirectory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Insert a new account, retrying matricule generation on collision
    pub async fn create(&self, candidate: AccountCandidate) -> Result<Account, AppError> {
        for attempt in 1..=MAX_MATRICULE_ATTEMPTS {
            let new = NewAccount {
                email: candidate.email.clone(),
                matricule: generate_matricule(),
                password_hash: candidate.password_hash.clone(),
                first_name: candidate.first_name.clone(),
                last_name: candidate.last_name.clone(),
                full_name: candidate.full_name.clone(),
                role: candidate.role,
                phone_number: candidate.phone_number.clone(),
                is_verified: candidate.is_verified,
                is_active: candidate.is_active,
                is_staff: candidate.is_staff,
            };

            match self.storage.insert_account(new).await {
                Err(AppError::DuplicateResource { field: "matricule", .. }) => {
                    tracing::debug!(attempt, "matricule collision, regenerating");
                },
                other => return other,
            }
        }
        Err(AppError::Internal("could not allocate a unique matricule".to_string()))
    }

    pub async fn find(&self, id: AccountId) -> Result<Account, AppError> {
        self.storage
            .account_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Account, AppError> {
        self.storage
            .account_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("account".to_string()))
    }

    /// Lookup that treats absence as a normal outcome
    pub async fn lookup_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.storage.account_by_email(email).await
    }

    pub async fn update(&self, id: AccountId, patch: &AccountPatch) -> Result<Account, AppError> {
        self.storage.update_account(id, patch).await
    }

    /// Validate and apply the editable profile fields
    pub async fn update_profile(
        &self,
        id: AccountId,
        request: &ProfileUpdateRequest,
        mode: UpdateMode,
    ) -> Result<Account, AppError> {
        let patch = profile_patch(request, mode)?;
        if patch.is_empty() {
            return self.find(id).await;
        }
        self.update(id, &patch).await
    }
}

/// Turn a profile request into a patch, reporting every invalid field
pub fn profile_patch(request: &ProfileUpdateRequest, mode: UpdateMode) -> Result<AccountPatch, AppError> {
    let mut v = Validator::new();
    let replace = mode == UpdateMode::Replace;

    let name = |v: &mut Validator, field: &str, value: &Option<String>| -> Option<String> {
        match value {
            Some(value) => v.check(field, validate_name(value)),
            None if replace => Some(String::new()),
            None => None,
        }
    };
    let first_name = name(&mut v, "first_name", &request.first_name);
    let last_name = name(&mut v, "last_name", &request.last_name);
    let full_name = name(&mut v, "full_name", &request.full_name);

    let nullable = |v: &mut Validator, field: &str, value: &Option<String>, phone: bool| -> Option<Option<String>> {
        match value {
            Some(value) if phone => v.check(field, validate_phone(Some(value))),
            Some(value) => v.check(field, validate_optional_text(Some(value))),
            None if replace => Some(None),
            None => None,
        }
    };
    let phone_number = nullable(&mut v, "phone_number", &request.phone_number, true);
    let address = nullable(&mut v, "address", &request.address, false);
    let profile_picture = nullable(&mut v, "profile_picture", &request.profile_picture, false);

    v.finish()?;

    Ok(AccountPatch {
        first_name,
        last_name,
        full_name,
        phone_number,
        address,
        profile_picture,
        ..AccountPatch::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn candidate(email: &str) -> AccountCandidate {
        AccountCandidate {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            full_name: "Awa Ndiaye".to_string(),
            role: Role::Learner,
            phone_number: Some("+237699001122".to_string()),
            is_verified: false,
            is_active: false,
            is_staff: false,
        }
    }

    fn directory() -> AccountDirectory {
        AccountDirectory::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_create_assigns_matricule() {
        let directory = directory();
        let account = directory.create(candidate("a@x.com")).await.unwrap();
        assert!(account.matricule.starts_with("SF"));
        assert!(!account.is_active);
        assert!(!account.is_verified);

        let found = directory.find_by_email("A@X.COM").await.unwrap();
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let directory = directory();
        directory.create(candidate("a@x.com")).await.unwrap();
        assert!(matches!(
            directory.create(candidate("a@x.com")).await,
            Err(AppError::DuplicateResource { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let directory = directory();
        assert!(matches!(directory.find(9).await, Err(AppError::NotFound(_))));
        assert!(matches!(directory.find_by_email("z@x.com").await, Err(AppError::NotFound(_))));
        assert!(directory.lookup_email("z@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_and_full_profile_updates() {
        let directory = directory();
        let account = directory.create(candidate("a@x.com")).await.unwrap();

        let request = ProfileUpdateRequest {
            address: Some("Douala".to_string()),
            ..Default::default()
        };
        let patched = directory
            .update_profile(account.id, &request, UpdateMode::Partial)
            .await
            .unwrap();
        assert_eq!(patched.address.as_deref(), Some("Douala"));
        assert_eq!(patched.full_name, "Awa Ndiaye");
        assert!(patched.phone_number.is_some());

        let replaced = directory
            .update_profile(account.id, &request, UpdateMode::Replace)
            .await
            .unwrap();
        assert_eq!(replaced.address.as_deref(), Some("Douala"));
        assert_eq!(replaced.full_name, "");
        assert!(replaced.phone_number.is_none());
    }

    #[test]
    fn test_invalid_profile_fields_are_reported_together() {
        let request = ProfileUpdateRequest {
            phone_number: Some("call me".to_string()),
            first_name: Some("<x>".to_string()),
            ..Default::default()
        };
        match profile_patch(&request, UpdateMode::Partial) {
            Err(AppError::Validation(errors)) => {
                assert!(errors.contains_key("phone_number"));
                assert!(errors.contains_key("first_name"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}

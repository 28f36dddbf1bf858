// ============================
// crates/backend-lib/src/models.rs
// ============================
//! Persisted records.
use chrono::{DateTime, NaiveDate, Utc};
use scholarflow_common::{
    AccountId, AccountStatus, EstablishmentStatus, EstablishmentView, Role, UserProfile,
};
use serde::{Deserialize, Serialize};

/// A user account as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub matricule: String,
    /// scrypt PHC string
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn status(&self) -> AccountStatus {
        match (self.is_active, self.is_verified) {
            (true, _) => AccountStatus::Active,
            (false, false) => AccountStatus::PendingVerification,
            (false, true) => AccountStatus::Suspended,
        }
    }

    /// Administrators may mutate establishments and other accounts
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.role == Role::Administrator
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            matricule: self.matricule.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            phone_number: self.phone_number.clone(),
            address: self.address.clone(),
            profile_picture: self.profile_picture.clone(),
            is_verified: self.is_verified,
            is_active: self.is_active,
            is_staff: self.is_staff,
            status: self.status(),
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Display name used in emails
    pub fn display_name(&self) -> &str {
        if !self.full_name.is_empty() {
            &self.full_name
        } else if !self.first_name.is_empty() {
            &self.first_name
        } else {
            &self.email
        }
    }
}

/// Candidate account; the storage assigns the id and timestamps
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub matricule: String,
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

impl NewAccount {
    pub(crate) fn into_account(self, id: AccountId, now: DateTime<Utc>) -> Account {
        Account {
            id,
            email: self.email,
            matricule: self.matricule,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            full_name: self.full_name,
            role: self.role,
            phone_number: self.phone_number,
            address: None,
            profile_picture: None,
            is_verified: self.is_verified,
            is_active: self.is_active,
            is_staff: self.is_staff,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update: `None` leaves a field untouched. For nullable columns
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub profile_picture: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub last_login: Option<DateTime<Utc>>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.full_name.is_none()
            && self.phone_number.is_none()
            && self.address.is_none()
            && self.profile_picture.is_none()
            && self.password_hash.is_none()
            && self.is_verified.is_none()
            && self.is_active.is_none()
            && self.last_login.is_none()
    }

    pub fn apply(&self, account: &mut Account, now: DateTime<Utc>) {
        if let Some(v) = &self.first_name {
            account.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            account.last_name = v.clone();
        }
        if let Some(v) = &self.full_name {
            account.full_name = v.clone();
        }
        if let Some(v) = &self.phone_number {
            account.phone_number = v.clone();
        }
        if let Some(v) = &self.address {
            account.address = v.clone();
        }
        if let Some(v) = &self.profile_picture {
            account.profile_picture = v.clone();
        }
        if let Some(v) = &self.password_hash {
            account.password_hash = v.clone();
        }
        if let Some(v) = self.is_verified {
            account.is_verified = v;
        }
        if let Some(v) = self.is_active {
            account.is_active = v;
        }
        if let Some(v) = self.last_login {
            account.last_login = Some(v);
        }
        account.updated_at = now;
    }
}

/// A school or institution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Establishment {
    /// School code, primary key
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub created_at: Option<NaiveDate>,
    pub status: EstablishmentStatus,
}

/// Partial establishment update, same conventions as [`AccountPatch`]
#[derive(Debug, Clone, Default)]
pub struct EstablishmentPatch {
    pub name: Option<String>,
    pub address: Option<Option<String>>,
    pub created_at: Option<Option<NaiveDate>>,
    pub status: Option<EstablishmentStatus>,
}

impl EstablishmentPatch {
    pub fn apply(&self, establishment: &mut Establishment) {
        if let Some(v) = &self.name {
            establishment.name = v.clone();
        }
        if let Some(v) = &self.address {
            establishment.address = v.clone();
        }
        if let Some(v) = self.created_at {
            establishment.created_at = v;
        }
        if let Some(v) = self.status {
            establishment.status = v;
        }
    }
}

impl Establishment {
    pub fn view(&self) -> EstablishmentView {
        EstablishmentView {
            code: self.code.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            created_at: self.created_at,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        NewAccount {
            email: "a@x.com".to_string(),
            matricule: "SF2026000001".to_string(),
            password_hash: "hash".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            full_name: String::new(),
            role: Role::Learner,
            phone_number: None,
            is_verified: false,
            is_active: false,
            is_staff: false,
        }
        .into_account(1, Utc::now())
    }

    #[test]
    fn test_status_derivation() {
        let mut account = account();
        assert_eq!(account.status(), AccountStatus::PendingVerification);

        account.is_verified = true;
        account.is_active = true;
        assert_eq!(account.status(), AccountStatus::Active);

        account.is_active = false;
        assert_eq!(account.status(), AccountStatus::Suspended);
    }

    #[test]
    fn test_patch_applies_only_provided_fields() {
        let mut account = account();
        account.phone_number = Some("+237600000000".to_string());
        let before = account.clone();

        let patch = AccountPatch {
            first_name: Some("Awa".to_string()),
            address: Some(Some("Douala".to_string())),
            ..Default::default()
        };
        let later = before.updated_at + chrono::Duration::seconds(5);
        patch.apply(&mut account, later);

        assert_eq!(account.first_name, "Awa");
        assert_eq!(account.address.as_deref(), Some("Douala"));
        assert_eq!(account.phone_number, before.phone_number);
        assert_eq!(account.password_hash, before.password_hash);
        assert_eq!(account.updated_at, later);
    }

    #[test]
    fn test_patch_can_clear_nullable_fields() {
        let mut account = account();
        account.phone_number = Some("+237600000000".to_string());

        let patch = AccountPatch {
            phone_number: Some(None),
            ..Default::default()
        };
        patch.apply(&mut account, Utc::now());
        assert!(account.phone_number.is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut account = account();
        assert_eq!(account.display_name(), "a@x.com");
        account.first_name = "Awa".to_string();
        assert_eq!(account.display_name(), "Awa");
        account.full_name = "Awa Ndiaye".to_string();
        assert_eq!(account.display_name(), "Awa Ndiaye");
    }
}

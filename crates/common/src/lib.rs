// ================
// crates/common/src/lib.rs
// ================
//! Wire types shared between the ScholarFlow API server and its clients.
//!
//! Every HTTP response is wrapped in an [`ApiResponse`] envelope
//! (`{success, message, data | errors}`); the request and response payloads
//! for each route live next to it so both sides agree on field names.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to an account by the storage layer
pub type AccountId = u64;

/// Field name -> list of problems with that field
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Uniform response envelope
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Stable machine-readable error code, only present on failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            code: None,
            errors: None,
        }
    }

    /// Attach a human readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Successful response with only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            code: None,
            errors: None,
        }
    }

    /// Failed response
    pub fn failure(code: impl Into<String>, message: impl Into<String>, errors: Option<FieldErrors>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            code: Some(code.into()),
            errors,
        }
    }
}

/// Account role
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[serde(alias = "etudiant")]
    Learner,
    #[serde(alias = "enseignant")]
    Instructor,
    #[serde(alias = "parent")]
    Guardian,
    #[serde(alias = "administrateur")]
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Instructor => "instructor",
            Role::Guardian => "guardian",
            Role::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "learner" | "etudiant" => Ok(Role::Learner),
            "instructor" | "enseignant" => Ok(Role::Instructor),
            "guardian" | "parent" => Ok(Role::Guardian),
            "administrator" | "administrateur" => Ok(Role::Administrator),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Lifecycle state of an account, derived from its flags
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    PendingVerification,
    Active,
    Suspended,
}

/// Establishment status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EstablishmentStatus {
    #[default]
    #[serde(alias = "actif")]
    Active,
    #[serde(alias = "inactif")]
    Inactive,
    #[serde(alias = "ferme")]
    Closed,
}

// ---------------------------------------------------------------------------
// Auth payloads
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyEmailRequest {
    pub uid: String,
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PasswordResetConfirmRequest {
    #[serde(default)]
    pub uid: Option<String>,
    pub token: String,
    pub new_password: String,
}

/// Access + refresh credentials handed to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// Always `Bearer`
    pub token_type: String,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
    pub user_id: AccountId,
    pub issued_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
    pub is_new_user: bool,
    pub email_verified: bool,
    /// Non-fatal problems, e.g. the verification email could not be sent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub access: String,
    pub refresh: String,
    pub tokens: TokenPair,
    pub email_verified: bool,
    pub verification_needed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: AccountId,
    pub token_type: String,
    pub email_verified: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerificationStatus {
    pub is_verified: bool,
}

// ---------------------------------------------------------------------------
// Profile payloads
// ---------------------------------------------------------------------------

/// Public view of an account
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: AccountId,
    pub email: String,
    pub matricule: String,
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
    pub status: AccountStatus,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT`/`PATCH /api/profile/`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, alias = "adresse")]
    pub address: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

/// Body of `PATCH /api/admin/accounts/{id}/status/`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccountStatusRequest {
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Establishment payloads
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EstablishmentView {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub created_at: Option<NaiveDate>,
    pub status: EstablishmentStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateEstablishmentRequest {
    #[serde(alias = "id", alias = "code_etablissement")]
    pub code: String,
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default, alias = "adresse")]
    pub address: Option<String>,
    #[serde(default, alias = "date_creation")]
    pub created_at: Option<NaiveDate>,
    #[serde(default, alias = "statut")]
    pub status: Option<EstablishmentStatus>,
}

/// Body of `PUT`/`PATCH /api/establishments/{code}/`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateEstablishmentRequest {
    #[serde(default, alias = "nom")]
    pub name: Option<String>,
    #[serde(default, alias = "adresse")]
    pub address: Option<String>,
    #[serde(default, alias = "date_creation")]
    pub created_at: Option<NaiveDate>,
    #[serde(default, alias = "statut")]
    pub status: Option<EstablishmentStatus>,
}

// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Field validation for request payloads.

use regex::Regex;
use scholarflow_common::FieldErrors;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::AppError;

const MIN_CODE_LENGTH: usize = 2;
const MAX_CODE_LENGTH: usize = 50;
const MAX_NAME_LENGTH: usize = 150;
const MAX_TEXT_LENGTH: usize = 255;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 .-]{6,18}[0-9]$").unwrap());
static CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^<>{}\[\];\\/]*$").unwrap());

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("This field is required.")]
    Required,

    #[error("Ensure this field has no more than {0} characters.")]
    TooLong(usize),

    #[error("Enter a valid email address.")]
    InvalidEmail,

    #[error("Enter a valid phone number.")]
    InvalidPhone,

    #[error("This field contains invalid characters.")]
    InvalidCharacters,

    #[error("Code must be {MIN_CODE_LENGTH} to {MAX_CODE_LENGTH} letters, digits, '-' or '_'.")]
    InvalidCode,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects per-field failures so a response can report all of them at once
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check<T>(&mut self, field: &str, result: ValidationResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(field, e.to_string());
                None
            },
        }
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: Vec<String>) {
        for message in messages {
            self.push(field, message);
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Lowercase and trim an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ValidationError::Required);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong(MAX_EMAIL_LENGTH));
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

/// Password presence and upper bound; the policy lives in `auth::password`
pub fn validate_password_field(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required);
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(MAX_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Optional phone number; blank means "not provided"
pub fn validate_phone(phone: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    if !PHONE_REGEX.is_match(phone) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(Some(phone.to_string()))
}

/// Person name component
pub fn validate_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(MAX_NAME_LENGTH));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(name.to_string())
}

/// Free text such as an address; blank becomes `None`
pub fn validate_optional_text(text: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong(MAX_TEXT_LENGTH));
    }
    Ok(Some(text.to_string()))
}

/// Required free text
pub fn validate_required_text(text: &str) -> ValidationResult<String> {
    validate_optional_text(Some(text))?.ok_or(ValidationError::Required)
}

/// Establishment code
pub fn validate_establishment_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationError::Required);
    }
    if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len()) || !CODE_REGEX.is_match(code) {
        return Err(ValidationError::InvalidCode);
    }
    Ok(code.to_string())
}

/// Escape text for inclusion in HTML
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

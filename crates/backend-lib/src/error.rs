// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use scholarflow_common::{ApiResponse, FieldErrors};
use thiserror::Error;

use crate::auth::jwt::TokenError;
use crate::auth::verification::VerificationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A resource with this {field} already exists: {value}")]
    DuplicateResource { field: &'static str, value: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account temporarily locked after repeated failed logins")]
    AccountLocked,

    #[error("Authentication credentials were not provided")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::Verification(_) => {
                StatusCode::BAD_REQUEST
            },
            AppError::DuplicateResource { .. } => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Token(TokenError::Encoding(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::AccountInactive | AppError::AccountLocked | AppError::PermissionDenied => {
                StatusCode::FORBIDDEN
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Io(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::InvalidInput(_) => "VAL_002",
            AppError::DuplicateResource { .. } => "DUP_001",
            AppError::InvalidCredentials => "AUTH_001",
            AppError::AccountInactive => "AUTH_002",
            AppError::AccountLocked => "AUTH_003",
            AppError::Unauthenticated => "AUTH_004",
            AppError::PermissionDenied => "AUTH_005",
            AppError::Token(TokenError::Expired) => "TOK_001",
            AppError::Token(TokenError::Revoked) => "TOK_002",
            AppError::Token(TokenError::Malformed(_)) => "TOK_003",
            AppError::Token(TokenError::Encoding(_)) => "TOK_004",
            AppError::Verification(VerificationError::Expired) => "VER_001",
            AppError::Verification(VerificationError::Malformed) => "VER_002",
            AppError::Verification(VerificationError::AlreadyConsumed) => "VER_003",
            AppError::Verification(VerificationError::UserStateChanged) => "VER_004",
            AppError::NotFound(_) => "NF_001",
            AppError::RateLimited { .. } => "RATE_001",
            AppError::Internal(_) => "INT_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) | AppError::InvalidInput(_) => {
                "Invalid input provided".to_string()
            },
            AppError::DuplicateResource { field, .. } => {
                format!("A resource with this {field} already exists")
            },
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::AccountInactive => "Account is inactive".to_string(),
            AppError::AccountLocked => {
                "Account temporarily locked due to multiple failed login attempts".to_string()
            },
            AppError::Unauthenticated => {
                "Authentication credentials were not provided".to_string()
            },
            AppError::PermissionDenied => {
                "You do not have permission to perform this action".to_string()
            },
            AppError::Token(TokenError::Expired) => "Token has expired".to_string(),
            AppError::Token(TokenError::Revoked) => "Token has been revoked".to_string(),
            AppError::Token(TokenError::Malformed(_)) => "Token is invalid".to_string(),
            AppError::Verification(VerificationError::Expired) => {
                "This link has expired, please request a new one".to_string()
            },
            AppError::Verification(VerificationError::AlreadyConsumed) => {
                "This link has already been used".to_string()
            },
            AppError::Verification(_) => {
                "Invalid link, please request a new one".to_string()
            },
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::RateLimited { .. } => {
                "Rate limit exceeded, please try again later".to_string()
            },
            AppError::Token(TokenError::Encoding(_))
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::Json(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        }

        // Detailed messages in development, never for server errors
        let message = if cfg!(debug_assertions) && !status.is_server_error() {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let errors = match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        };

        let body = ApiResponse::failure(error_code, message, errors);
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::field("body", rejection.body_text())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {err}"))
    }
}

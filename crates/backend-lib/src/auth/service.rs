use async_trait::async_trait;
use scholarflow_common::{
    AccountId, LoginRequest, LoginResponse, PasswordResetConfirmRequest, PasswordResetRequest, RefreshRequest,
    RegisterRequest, RegisterResponse, TokenPair, TokenValidation, UserProfile, VerificationStatus,
    VerifyEmailRequest,
};

use super::jwt::Claims;
use crate::error::AppError;
use crate::models::Account;

/// Registration, verification, credential lifecycle and password management
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create a pending account, email a verification link and issue a credential pair
    async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, AppError>;

    /// Consume an email verification link and activate the account
    async fn verify_email(&self, request: VerifyEmailRequest) -> Result<UserProfile, AppError>;

    /// Send a fresh verification link, subject to a per-account cooldown
    async fn resend_verification(&self, account: &Account) -> Result<String, AppError>;

    async fn verification_status(&self, account: &Account) -> VerificationStatus;

    async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError>;

    /// Rotate a refresh token into a new pair
    async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, AppError>;

    /// Revoke the presented access token and, optionally, a refresh token
    async fn logout(&self, access: &Claims, refresh: Option<&str>) -> Result<(), AppError>;

    /// Resolve a bearer access token to its claims and current account record
    async fn authenticate(&self, bearer: &str) -> Result<(Claims, Account), AppError>;

    async fn validate_token(&self, claims: &Claims, account: &Account) -> TokenValidation;

    /// Always succeeds for well-formed emails, whether or not an account exists
    async fn request_password_reset(&self, request: PasswordResetRequest) -> Result<(), AppError>;

    async fn confirm_password_reset(&self, request: PasswordResetConfirmRequest) -> Result<(), AppError>;

    async fn change_password(&self, account: &Account, current: &str, new: &str) -> Result<Account, AppError>;

    /// Suspend or reactivate an account; suspension revokes its tokens
    async fn set_account_active(&self, id: AccountId, active: bool) -> Result<Account, AppError>;

    /// Create an active, verified staff administrator
    async fn create_admin(&self, email: &str, password: &str) -> Result<Account, AppError>;
}

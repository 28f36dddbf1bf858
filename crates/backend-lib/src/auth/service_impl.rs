use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use scholarflow_common::{
    AccountId, LoginRequest, LoginResponse, PasswordResetConfirmRequest, PasswordResetRequest, RefreshRequest,
    RegisterRequest, RegisterResponse, Role, TokenPair, TokenValidation, UserProfile, VerificationStatus,
    VerifyEmailRequest,
};
use tokio::sync::OnceCell;

use super::jwt::{Claims, TokenCodec, TokenError, TokenType};
use super::password::{dummy_hash, hash_password_secure, validate_password_strength, verify_password};
use super::rate_limit::LoginLockout;
use super::revocation::{RevocationStore, TokenManager};
use super::verification::{decode_uid, encode_uid, Purpose, VerificationError, VerificationTokenIssuer, VerifiedLink};
use super::AuthService;
use crate::accounts::{AccountCandidate, AccountDirectory};
use crate::cache::{keys, Cache};
use crate::config::Settings;
use crate::email::{EmailDispatcher, EmailTemplate};
use crate::error::AppError;
use crate::metrics as m;
use crate::models::{Account, AccountPatch};
use crate::storage::Storage;
use crate::validation::{normalize_email, validate_email, validate_name, validate_password_field, validate_phone, Validator};

const VERIFY_EMAIL_PATH: &str = "auth/email-verify";
const RESET_PASSWORD_PATH: &str = "auth/password-reset-confirm";

/// Default orchestrator over the account directory, token manager,
/// verification issuer and email dispatcher
pub struct DefaultAuth {
    settings: Arc<Settings>,
    accounts: AccountDirectory,
    tokens: TokenManager,
    links: VerificationTokenIssuer,
    email: EmailDispatcher,
    cache: Arc<dyn Cache>,
    lockout: LoginLockout,
    dummy_hash: OnceCell<String>,
}

impl DefaultAuth {
    pub fn new(
        settings: Arc<Settings>,
        storage: Arc<dyn Storage>,
        cache: Arc<dyn Cache>,
        email: EmailDispatcher,
    ) -> Self {
        let tokens = TokenManager::new(
            TokenCodec::new(&settings.jwt),
            RevocationStore::new(Arc::clone(&cache)),
        );
        let links = VerificationTokenIssuer::new(
            settings.verification_secret(),
            Duration::from_secs(settings.verification.email_ttl_secs),
            Duration::from_secs(settings.verification.password_reset_ttl_secs),
            Arc::clone(&cache),
        );
        let lockout = LoginLockout::new(
            settings.login_lockout.max_attempts,
            Duration::from_secs(settings.login_lockout.lockout_secs),
            Duration::from_secs(settings.login_lockout.failure_window_secs),
        );

        Self {
            accounts: AccountDirectory::new(storage),
            tokens,
            links,
            email,
            cache,
            lockout,
            dummy_hash: OnceCell::new(),
            settings,
        }
    }

    pub fn lockout(&self) -> &LoginLockout {
        &self.lockout
    }

    fn log_n(&self) -> u8 {
        self.settings.password_requirements.password_hash_log_n
    }

    /// scrypt is CPU-bound; keep it off the async workers
    async fn hash(&self, plain: &str) -> Result<String, AppError> {
        let mut plain = plain.to_string();
        let log_n = self.log_n();
        tokio::task::spawn_blocking(move || hash_password_secure(&mut plain, log_n))
            .await?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify(&self, hash: &str, plain: &str) -> Result<bool, AppError> {
        let (hash, plain) = (hash.to_string(), plain.to_string());
        Ok(tokio::task::spawn_blocking(move || verify_password(&hash, &plain)).await?)
    }

    async fn burn_dummy_verification(&self, plain: &str) -> Result<(), AppError> {
        let log_n = self.log_n();
        let hash = self
            .dummy_hash
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || dummy_hash(log_n))
                    .await?
                    .map_err(|e| AppError::Internal(e.to_string()))
            })
            .await?;
        self.verify(hash, plain).await?;
        Ok(())
    }

    fn password_problems(&self, password: &str, email: Option<&str>) -> Vec<String> {
        validate_password_strength(password, &self.settings.password_requirements, email)
    }

    fn expiry_hours(&self, purpose: Purpose) -> u64 {
        self.links.ttl(purpose).as_secs() / 3600
    }

    /// Email a verification link; returns a warning if an inline send failed
    async fn send_verification_link(&self, account: &Account) -> Option<String> {
        let token = self.links.generate(account, Purpose::EmailVerification);
        let url = self.email.link(VERIFY_EMAIL_PATH, &encode_uid(account.id), &token);
        let ctx = self.email.context(
            account.display_name(),
            url,
            self.expiry_hours(Purpose::EmailVerification),
        );
        self.email.dispatch(EmailTemplate::VerifyEmail, ctx, &account.email).await
    }

    /// Decode a link and load the account it names. Unknown accounts and
    /// mismatched `uid` values are reported as malformed links.
    async fn resolve_link(
        &self,
        token: &str,
        uid: Option<&str>,
        purpose: Purpose,
    ) -> Result<(VerifiedLink, Account), AppError> {
        let link = self.links.decode(token, purpose)?;
        if let Some(uid) = uid.filter(|u| !u.is_empty()) {
            if decode_uid(uid) != Some(link.user_id) {
                return Err(VerificationError::Malformed.into());
            }
        }
        let account = match self.accounts.find(link.user_id).await {
            Ok(account) => account,
            Err(AppError::NotFound(_)) => return Err(VerificationError::Malformed.into()),
            Err(e) => return Err(e),
        };
        self.links.verify(&link, &account).await?;
        Ok((link, account))
    }

    /// Load the account a token speaks for
    async fn token_account(&self, claims: &Claims) -> Result<Account, AppError> {
        match self.accounts.find(claims.user_id()?).await {
            Ok(account) => Ok(account),
            Err(AppError::NotFound(_)) => Err(TokenError::Malformed("unknown account".to_string()).into()),
            Err(e) => Err(e),
        }
    }

    async fn set_password(&self, account: &Account, new_password: &str) -> Result<Account, AppError> {
        let hash = self.hash(new_password).await?;
        let patch = AccountPatch {
            password_hash: Some(hash),
            ..AccountPatch::default()
        };
        self.accounts.update(account.id, &patch).await
    }

    /// Remaining cooldown for a rate key, used for `retry_after`
    async fn cooldown_left(&self, key: &str, fallback: u64) -> Result<u64, AppError> {
        Ok(self
            .cache
            .ttl(key)
            .await?
            .map(|d| d.as_secs().max(1))
            .unwrap_or(fallback))
    }
}

fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

#[async_trait]
impl AuthService for DefaultAuth {
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, AppError> {
        let mut v = Validator::new();
        let email = v.check("email", validate_email(&request.email));
        if v.check("password", validate_password_field(&request.password)).is_some() {
            v.extend("password", self.password_problems(&request.password, email.as_deref()));
        }
        let phone_number = v.check("phone_number", validate_phone(request.phone_number.as_deref()));
        let full_name = v.check("full_name", validate_name(request.full_name.as_deref().unwrap_or_default()));
        let role = request.role.unwrap_or_default();
        if role == Role::Administrator {
            v.push("role", "Self-registration as administrator is not allowed.");
        }
        v.finish()?;

        let (Some(email), Some(phone_number), Some(full_name)) = (email, phone_number, full_name) else {
            return Err(AppError::Internal("validated fields missing".to_string()));
        };

        let password_hash = self.hash(&request.password).await?;
        let (first_name, last_name) = split_full_name(&full_name);
        let verified = !self.settings.require_email_verification;

        let account = self
            .accounts
            .create(AccountCandidate {
                email,
                password_hash,
                first_name,
                last_name,
                full_name,
                role,
                phone_number,
                is_verified: verified,
                is_active: verified,
                is_staff: false,
            })
            .await?;

        counter!(m::ACCOUNT_REGISTERED).increment(1);
        tracing::info!(user_id = account.id, matricule = %account.matricule, "account registered");

        let tokens = self.tokens.issue_pair(&account).await?;

        let mut warnings = Vec::new();
        if !account.is_verified {
            if let Some(warning) = self.send_verification_link(&account).await {
                warnings.push(warning);
            }
        }

        Ok(RegisterResponse {
            email_verified: account.is_verified,
            user: account.profile(),
            tokens,
            is_new_user: true,
            warnings,
        })
    }

    #[tracing::instrument(skip(self, request))]
    async fn verify_email(&self, request: VerifyEmailRequest) -> Result<UserProfile, AppError> {
        let (link, account) = self
            .resolve_link(&request.token, Some(request.uid.as_str()), Purpose::EmailVerification)
            .await?;
        self.links.consume(&link).await?;

        if account.is_verified {
            tracing::info!(user_id = account.id, "email already verified");
            return Ok(account.profile());
        }

        let patch = AccountPatch {
            is_verified: Some(true),
            is_active: Some(true),
            ..AccountPatch::default()
        };
        let account = self.accounts.update(account.id, &patch).await?;

        counter!(m::ACCOUNT_VERIFIED).increment(1);
        tracing::info!(user_id = account.id, "email verified, account activated");
        Ok(account.profile())
    }

    #[tracing::instrument(skip(self, account), fields(user_id = account.id))]
    async fn resend_verification(&self, account: &Account) -> Result<String, AppError> {
        if account.is_verified {
            return Ok("Email is already verified.".to_string());
        }

        let cooldown = self.settings.verification.resend_cooldown_secs;
        let key = keys::verification_email_rate(account.id);
        if !self
            .cache
            .put_if_absent(&key, "1", Duration::from_secs(cooldown))
            .await?
        {
            let retry_after_secs = self.cooldown_left(&key, cooldown).await?;
            return Err(AppError::RateLimited { retry_after_secs });
        }

        match self.send_verification_link(account).await {
            Some(warning) => {
                // let the user try again straight away
                self.cache.delete(&key).await?;
                Err(AppError::Internal(warning))
            },
            None => Ok("Verification email sent.".to_string()),
        }
    }

    async fn verification_status(&self, account: &Account) -> VerificationStatus {
        VerificationStatus {
            is_verified: account.is_verified,
        }
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        let email = normalize_email(&request.email);
        let mut v = Validator::new();
        v.check("email", validate_email(&email));
        v.check("password", validate_password_field(&request.password));
        v.finish()?;

        if self.lockout.is_locked(&email) {
            counter!(m::LOGIN_FAILURE, "reason" => "locked").increment(1);
            return Err(AppError::AccountLocked);
        }

        let account = self.accounts.lookup_email(&email).await?;
        let password_ok = match &account {
            Some(account) => self.verify(&account.password_hash, &request.password).await?,
            None => {
                self.burn_dummy_verification(&request.password).await?;
                false
            },
        };

        let account = match (account, password_ok) {
            (Some(account), true) => account,
            _ => {
                counter!(m::LOGIN_FAILURE, "reason" => "credentials").increment(1);
                tracing::warn!("failed login attempt");
                if self.lockout.record_failed_attempt(&email) {
                    return Err(AppError::AccountLocked);
                }
                return Err(AppError::InvalidCredentials);
            },
        };
        self.lockout.record_success(&email);

        if !account.is_active {
            counter!(m::LOGIN_FAILURE, "reason" => "inactive").increment(1);
            tracing::warn!(user_id = account.id, status = ?account.status(), "login refused for inactive account");
            return Err(AppError::AccountInactive);
        }

        let patch = AccountPatch {
            last_login: Some(Utc::now()),
            ..AccountPatch::default()
        };
        let account = self.accounts.update(account.id, &patch).await?;
        let tokens = self.tokens.issue_pair(&account).await?;

        counter!(m::LOGIN_SUCCESS).increment(1);
        tracing::info!(user_id = account.id, "login succeeded");

        Ok(LoginResponse {
            user: account.profile(),
            access: tokens.access.clone(),
            refresh: tokens.refresh.clone(),
            tokens,
            email_verified: account.is_verified,
            verification_needed: !account.is_verified,
        })
    }

    #[tracing::instrument(skip(self, request))]
    async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, AppError> {
        if request.refresh.trim().is_empty() {
            return Err(AppError::field("refresh", "This field is required."));
        }

        // revoked before the replacement pair exists
        let claims = self.tokens.consume_refresh(request.refresh.trim()).await?;
        let account = self.token_account(&claims).await?;
        if !account.is_active {
            return Err(AppError::AccountInactive);
        }

        let pair = self.tokens.issue_pair(&account).await?;
        counter!(m::TOKEN_REFRESHED).increment(1);
        tracing::debug!(user_id = account.id, "refresh token rotated");
        Ok(pair)
    }

    #[tracing::instrument(skip(self, access, refresh), fields(sub = %access.sub))]
    async fn logout(&self, access: &Claims, refresh: Option<&str>) -> Result<(), AppError> {
        // Reject a bad refresh token before anything is revoked
        let refresh = match refresh.map(str::trim).filter(|r| !r.is_empty()) {
            Some(refresh) => match self.tokens.codec().decode_as(refresh, TokenType::Refresh) {
                Ok(claims) if claims.sub == access.sub => Some(claims),
                Ok(_) => {
                    return Err(TokenError::Malformed("refresh token belongs to another account".to_string()).into())
                },
                // already unusable
                Err(TokenError::Expired) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        self.tokens.revoke(access).await?;
        if let Some(claims) = &refresh {
            self.tokens.revoke(claims).await?;
        }

        tracing::info!("logged out");
        Ok(())
    }

    async fn authenticate(&self, bearer: &str) -> Result<(Claims, Account), AppError> {
        let claims = self.tokens.authenticate(bearer, TokenType::Access).await?;
        let account = self.token_account(&claims).await?;
        Ok((claims, account))
    }

    async fn validate_token(&self, claims: &Claims, account: &Account) -> TokenValidation {
        TokenValidation {
            valid: true,
            user_id: account.id,
            token_type: claims.token_type.to_string(),
            email_verified: account.is_verified,
        }
    }

    #[tracing::instrument(skip(self, request))]
    async fn request_password_reset(&self, request: PasswordResetRequest) -> Result<(), AppError> {
        let email = validate_email(&request.email).map_err(|e| AppError::field("email", e.to_string()))?;

        let cooldown = Duration::from_secs(self.settings.verification.reset_request_cooldown_secs);
        if !self
            .cache
            .put_if_absent(&keys::password_reset_rate(&email), "1", cooldown)
            .await?
        {
            tracing::info!("password reset throttled");
            return Ok(());
        }

        counter!(m::PASSWORD_RESET_REQUESTED).increment(1);
        let Some(account) = self.accounts.lookup_email(&email).await? else {
            tracing::info!("password reset requested for unknown email");
            return Ok(());
        };

        let token = self.links.generate(&account, Purpose::PasswordReset);
        let url = self.email.link(RESET_PASSWORD_PATH, &encode_uid(account.id), &token);
        let ctx = self.email.context(account.display_name(), url, self.expiry_hours(Purpose::PasswordReset));
        if let Some(warning) = self.email.dispatch(EmailTemplate::PasswordReset, ctx, &account.email).await {
            tracing::warn!(user_id = account.id, %warning, "password reset email not delivered");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, request))]
    async fn confirm_password_reset(&self, request: PasswordResetConfirmRequest) -> Result<(), AppError> {
        let (link, account) = self
            .resolve_link(&request.token, request.uid.as_deref(), Purpose::PasswordReset)
            .await?;

        let mut v = Validator::new();
        if v.check("new_password", validate_password_field(&request.new_password)).is_some() {
            v.extend("new_password", self.password_problems(&request.new_password, Some(&account.email)));
        }
        v.finish()?;

        self.links.consume(&link).await?;
        let account = self.set_password(&account, &request.new_password).await?;
        self.tokens.revoke_all_for_user(account.id).await?;
        self.lockout.record_success(&account.email);

        counter!(m::PASSWORD_CHANGED, "via" => "reset").increment(1);
        tracing::info!(user_id = account.id, "password reset completed");
        Ok(())
    }

    #[tracing::instrument(skip(self, account, current, new), fields(user_id = account.id))]
    async fn change_password(&self, account: &Account, current: &str, new: &str) -> Result<Account, AppError> {
        if !self.verify(&account.password_hash, current).await? {
            tracing::warn!("password change with wrong current password");
            return Err(AppError::InvalidCredentials);
        }

        let mut v = Validator::new();
        if v.check("new_password", validate_password_field(new)).is_some() {
            v.extend("new_password", self.password_problems(new, Some(&account.email)));
        }
        if current == new {
            v.push("new_password", "The new password must differ from the current one.");
        }
        v.finish()?;

        let account = self.set_password(account, new).await?;
        self.tokens.revoke_all_for_user(account.id).await?;

        counter!(m::PASSWORD_CHANGED, "via" => "profile").increment(1);
        tracing::info!("password changed");
        Ok(account)
    }

    #[tracing::instrument(skip(self))]
    async fn set_account_active(&self, id: AccountId, active: bool) -> Result<Account, AppError> {
        let patch = AccountPatch {
            is_active: Some(active),
            ..AccountPatch::default()
        };
        let account = self.accounts.update(id, &patch).await?;
        if !active {
            self.tokens.revoke_all_for_user(id).await?;
        }
        tracing::info!(status = ?account.status(), "account status changed");
        Ok(account)
    }

    #[tracing::instrument(skip(self, password))]
    async fn create_admin(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let mut v = Validator::new();
        let email = v.check("email", validate_email(email));
        v.extend("password", self.password_problems(password, email.as_deref()));
        v.finish()?;
        let Some(email) = email else {
            return Err(AppError::Internal("validated email missing".to_string()));
        };

        let password_hash = self.hash(password).await?;
        let account = self
            .accounts
            .create(AccountCandidate {
                email,
                password_hash,
                first_name: String::new(),
                last_name: String::new(),
                full_name: String::new(),
                role: Role::Administrator,
                phone_number: None,
                is_verified: true,
                is_active: true,
                is_staff: true,
            })
            .await?;
        tracing::info!(user_id = account.id, "administrator created");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::email::MemoryMailer;
    use crate::storage::MemoryStorage;

    struct Harness {
        auth: DefaultAuth,
        mailer: MemoryMailer,
    }

    fn harness() -> Harness {
        let mut settings = Settings::default();
        settings.password_requirements.password_hash_log_n = 4;
        settings.email.background = false;
        let settings = Arc::new(settings);

        let mailer = MemoryMailer::new();
        let email = EmailDispatcher::new(Arc::new(mailer.clone()), &settings);
        let auth = DefaultAuth::new(
            settings,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryCache::new()),
            email,
        );
        Harness { auth, mailer }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "P@ssw0rd!".to_string(),
            phone_number: None,
            full_name: Some("Awa Ndiaye".to_string()),
            role: None,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    /// Pull `(uid, token)` from the last link mailed to `to`
    fn link_from(mailer: &MemoryMailer, to: &str, template: EmailTemplate) -> (String, String) {
        let email = mailer.last_to(to, template).expect("email sent");
        let query = email
            .text
            .split_whitespace()
            .find_map(|w| w.split_once('?').map(|(_, q)| q.to_string()))
            .expect("link in body");
        let mut uid = String::new();
        let mut token = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("uid", v)) => uid = v.to_string(),
                Some(("token", v)) => token = v.to_string(),
                _ => {},
            }
        }
        (uid, token)
    }

    #[tokio::test]
    async fn test_register_creates_pending_account() {
        let h = harness();
        let response = h.auth.register(register_request("a@x.com")).await.unwrap();

        assert!(!response.user.is_active);
        assert!(!response.user.is_verified);
        assert!(!response.email_verified);
        assert!(response.is_new_user);
        assert_eq!(response.user.first_name, "Awa");
        assert_eq!(response.user.last_name, "Ndiaye");
        assert!(!response.tokens.access.is_empty());
        assert!(h.mailer.last_to("a@x.com", EmailTemplate::VerifyEmail).is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_admin_role_and_weak_password() {
        let h = harness();
        let mut request = register_request("a@x.com");
        request.role = Some(Role::Administrator);
        request.password = "short".to_string();

        match h.auth.register(request).await {
            Err(AppError::Validation(errors)) => {
                assert!(errors.contains_key("role"));
                assert!(errors.contains_key("password"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_email_failure_does_not_fail_registration() {
        let h = harness();
        h.mailer.set_failing(true);
        let response = h.auth.register(register_request("a@x.com")).await.unwrap();
        assert_eq!(response.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_account_cannot_login_until_verified() {
        let h = harness();
        h.auth.register(register_request("a@x.com")).await.unwrap();

        assert!(matches!(
            h.auth.login(login_request("a@x.com", "P@ssw0rd!")).await,
            Err(AppError::AccountInactive)
        ));

        let (uid, token) = link_from(&h.mailer, "a@x.com", EmailTemplate::VerifyEmail);
        let profile = h.auth.verify_email(VerifyEmailRequest { uid: uid.clone(), token: token.clone() }).await.unwrap();
        assert!(profile.is_active && profile.is_verified);

        let response = h.auth.login(login_request("a@x.com", "P@ssw0rd!")).await.unwrap();
        assert!(response.email_verified);
        assert!(!response.verification_needed);
        assert!(response.user.last_login.is_some());

        assert!(matches!(
            h.auth.verify_email(VerifyEmailRequest { uid, token }).await,
            Err(AppError::Verification(VerificationError::AlreadyConsumed))
        ));
    }

    #[tokio::test]
    async fn test_login_lockout() {
        let h = harness();
        h.auth.register(register_request("a@x.com")).await.unwrap();

        for _ in 0..4 {
            assert!(matches!(
                h.auth.login(login_request("a@x.com", "Wrong#Pass1")).await,
                Err(AppError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            h.auth.login(login_request("a@x.com", "Wrong#Pass1")).await,
            Err(AppError::AccountLocked)
        ));
        assert!(matches!(
            h.auth.login(login_request("a@x.com", "P@ssw0rd!")).await,
            Err(AppError::AccountLocked)
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid_credentials() {
        let h = harness();
        assert!(matches!(
            h.auth.login(login_request("ghost@x.com", "P@ssw0rd!")).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_resend_verification_cooldown() {
        let h = harness();
        let response = h.auth.register(register_request("a@x.com")).await.unwrap();
        let account = h.auth.accounts.find(response.user.id).await.unwrap();

        h.auth.resend_verification(&account).await.unwrap();
        match h.auth.resend_verification(&account).await {
            Err(AppError::RateLimited { retry_after_secs }) => assert!(retry_after_secs > 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_password_reset_is_enumeration_safe_and_state_bound() {
        let h = harness();
        h.auth.register(register_request("a@x.com")).await.unwrap();

        h.auth
            .request_password_reset(PasswordResetRequest { email: "ghost@x.com".to_string() })
            .await
            .unwrap();
        h.auth
            .request_password_reset(PasswordResetRequest { email: "a@x.com".to_string() })
            .await
            .unwrap();
        assert!(h.mailer.last_to("ghost@x.com", EmailTemplate::PasswordReset).is_none());

        let (uid, token) = link_from(&h.mailer, "a@x.com", EmailTemplate::PasswordReset);
        // a verification link issued before the change
        let (v_uid, v_token) = link_from(&h.mailer, "a@x.com", EmailTemplate::VerifyEmail);

        h.auth
            .confirm_password_reset(PasswordResetConfirmRequest {
                uid: Some(uid),
                token,
                new_password: "N3w#Secret".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            h.auth.verify_email(VerifyEmailRequest { uid: v_uid, token: v_token }).await,
            Err(AppError::Verification(VerificationError::UserStateChanged))
        ));
    }

    #[tokio::test]
    async fn test_suspension_revokes_tokens() {
        let h = harness();
        let admin = h.auth.create_admin("root@x.com", "Adm1n#Strong").await.unwrap();
        let login = h.auth.login(login_request("root@x.com", "Adm1n#Strong")).await.unwrap();

        let suspended = h.auth.set_account_active(admin.id, false).await.unwrap();
        assert!(!suspended.is_active);
        assert!(matches!(
            h.auth.authenticate(&login.access).await,
            Err(AppError::Token(TokenError::Revoked))
        ));
        assert!(matches!(
            h.auth.login(login_request("root@x.com", "Adm1n#Strong")).await,
            Err(AppError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn test_logout_with_foreign_refresh_keeps_session() {
        let h = harness();
        let mine = h.auth.register(register_request("a@x.com")).await.unwrap().tokens;
        let theirs = h.auth.register(register_request("b@x.com")).await.unwrap().tokens;

        let (claims, _) = h.auth.authenticate(&mine.access).await.unwrap();
        assert!(h.auth.logout(&claims, Some(&theirs.refresh)).await.is_err());
        assert!(h.auth.logout(&claims, Some("garbage")).await.is_err());

        // Nothing was revoked by the rejected calls
        assert!(h.auth.authenticate(&mine.access).await.is_ok());
        assert!(h.auth.authenticate(&theirs.access).await.is_ok());

        h.auth.logout(&claims, Some(&mine.refresh)).await.unwrap();
        assert!(matches!(
            h.auth.authenticate(&mine.access).await,
            Err(AppError::Token(TokenError::Revoked))
        ));
        let reuse = RefreshRequest {
            refresh: mine.refresh.clone(),
        };
        assert!(h.auth.refresh(reuse).await.is_err());
    }
}

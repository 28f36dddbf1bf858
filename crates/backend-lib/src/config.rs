// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! environment variables prefixed with `SCHOLARFLOW_` (nested keys use `__`,
//! e.g. `SCHOLARFLOW_JWT__SECRET`).
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SCHOLARFLOW_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_SECRET_LENGTH: usize = 32;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Product name used in emails
    pub app_name: String,
    /// Base URL of the client application, used to build email links
    pub frontend_url: String,
    /// Whether new accounts must confirm their email before logging in
    pub require_email_verification: bool,
    pub jwt: JwtSettings,
    pub verification: VerificationSettings,
    pub password_requirements: PasswordRequirements,
    pub email: EmailSettings,
    pub rate_limit: RateLimitSettings,
    pub login_lockout: LoginLockoutSettings,
}

/// Signed credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

/// Email verification and password reset links
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// HMAC key; the JWT secret is used when empty
    pub secret: String,
    pub email_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
    /// Minimum delay between two verification emails for one account
    pub resend_cooldown_secs: u64,
    /// Minimum delay between two reset emails for one address
    pub reset_request_cooldown_secs: u64,
}

/// Password complexity requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    /// Minimum password length
    pub min_length: usize,
    /// Require uppercase letters
    pub require_uppercase: bool,
    /// Require lowercase letters
    pub require_lowercase: bool,
    /// Require digits
    pub require_digit: bool,
    /// Require special characters
    pub require_special: bool,
    /// scrypt cost parameter (log2 of N)
    pub password_hash_log_n: u8,
}

/// Outgoing mail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// When false messages are only logged
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    /// Send from a background task instead of inside the request
    pub background: bool,
}

/// Per-client request limit on the auth routes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Key clients on `X-Real-IP` / `X-Forwarded-For` instead of the peer
    /// address. Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

/// Failed login lockout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginLockoutSettings {
    pub max_attempts: u32,
    pub lockout_secs: u64,
    /// Failures further apart than this start a fresh count
    pub failure_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            app_name: "ScholarFlow".to_string(),
            frontend_url: "http://localhost:8000/api".to_string(),
            require_email_verification: true,
            jwt: JwtSettings::default(),
            verification: VerificationSettings::default(),
            password_requirements: PasswordRequirements::default(),
            email: EmailSettings::default(),
            rate_limit: RateLimitSettings::default(),
            login_lockout: LoginLockoutSettings::default(),
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "insecure-development-secret-change-me-0000".to_string(),
            issuer: "scholarflow".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 14 * 24 * 60 * 60,
        }
    }
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            email_ttl_secs: 3 * 24 * 60 * 60,
            password_reset_ttl_secs: 3 * 24 * 60 * 60,
            resend_cooldown_secs: 300,
            reset_request_cooldown_secs: 300,
        }
    }
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            password_hash_log_n: 15,
        }
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: String::new(),
            background: true,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
            trust_proxy_headers: false,
        }
    }
}

impl Default for LoginLockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 15 * 60,
            failure_window_secs: 30 * 60,
        }
    }
}

impl JwtSettings {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

impl Settings {
    /// Load settings from `config.toml` in the working directory and the environment
    pub fn load() -> Result<Self> {
        Self::figment(Path::new("config.toml")).extract().map_err(Into::into)
    }

    /// Load settings from an explicit file and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
        Self::figment(path).extract().map_err(Into::into)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Key used to sign verification and reset links
    pub fn verification_secret(&self) -> &str {
        if self.verification.secret.is_empty() {
            &self.jwt.secret
        } else {
            &self.verification.secret
        }
    }

    /// Reject settings the server cannot run safely with
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("invalid log level '{}'", self.log_level);
        }

        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            bail!("jwt.secret must be at least {MIN_SECRET_LENGTH} bytes");
        }
        if self.jwt.access_ttl_secs == 0 || self.jwt.refresh_ttl_secs == 0 {
            bail!("token lifetimes must be greater than zero");
        }
        if self.jwt.access_ttl_secs >= self.jwt.refresh_ttl_secs {
            bail!("access tokens must expire before refresh tokens");
        }

        if self.verification.email_ttl_secs == 0 || self.verification.password_reset_ttl_secs == 0 {
            bail!("verification link lifetimes must be greater than zero");
        }

        let pw = &self.password_requirements;
        if pw.min_length < 8 {
            bail!("password_requirements.min_length must be at least 8");
        }
        if !(1..=20).contains(&pw.password_hash_log_n) {
            bail!("password_requirements.password_hash_log_n must be between 1 and 20");
        }

        if self.email.enabled && (self.email.smtp_username.is_empty() || self.email.smtp_password.is_empty()) {
            bail!("email is enabled but SMTP credentials are not configured");
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            bail!("rate_limit values must be greater than zero");
        }
        if self.login_lockout.max_attempts == 0 {
            bail!("login_lockout.max_attempts must be greater than zero");
        }
        if self.login_lockout.failure_window_secs == 0 {
            bail!("login_lockout.failure_window_secs must be greater than zero");
        }

        Ok(())
    }
}

// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const ACCOUNT_REGISTERED: &str = "account.registered";
pub const ACCOUNT_VERIFIED: &str = "account.verified";
pub const LOGIN_SUCCESS: &str = "auth.login.success";
pub const LOGIN_FAILURE: &str = "auth.login.failure";
pub const LOGIN_LOCKOUT: &str = "auth.login.lockout";
pub const TOKEN_ISSUED: &str = "auth.token.issued";
pub const TOKEN_REFRESHED: &str = "auth.token.refreshed";
pub const TOKEN_REVOKED: &str = "auth.token.revoked";
pub const TOKEN_REJECTED: &str = "auth.token.rejected";
pub const PASSWORD_RESET_REQUESTED: &str = "auth.password_reset.requested";
pub const PASSWORD_CHANGED: &str = "auth.password.changed";
pub const EMAIL_SENT: &str = "email.sent";
pub const EMAIL_FAILED: &str = "email.failed";
pub const CACHE_ENTRIES: &str = "cache.entries";
pub const RATE_LIMITED: &str = "http.rate_limited";

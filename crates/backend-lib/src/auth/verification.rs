//! Single-use email verification and password reset links.
//!
//! A token reads `{uidb64}.{expiry}.{fingerprint}.{mac}`. The fingerprint is
//! derived from the account's password hash and email, so any change to
//! either invalidates every outstanding token for that account.
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use scholarflow_common::AccountId;
use sha2::{Digest, Sha256};

use crate::cache::{keys, Cache};
use crate::error::AppError;
use crate::models::Account;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters kept from the state fingerprint
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Verification link expired")]
    Expired,

    #[error("Verification link is invalid")]
    Malformed,

    #[error("Verification link already used")]
    AlreadyConsumed,

    #[error("Account changed since the link was issued")]
    UserStateChanged,
}

/// What a token may be used for; purposes are not interchangeable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    EmailVerification,
    PasswordReset,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::EmailVerification => "email_verification",
            Purpose::PasswordReset => "password_reset",
        }
    }
}

/// A token whose structure and MAC check out
#[derive(Debug, Clone)]
pub struct VerifiedLink {
    pub user_id: AccountId,
    pub purpose: Purpose,
    pub expires_at: i64,
    fingerprint: String,
    digest: String,
}

/// Issues and checks verification tokens
#[derive(Clone)]
pub struct VerificationTokenIssuer {
    key: Vec<u8>,
    email_ttl: Duration,
    reset_ttl: Duration,
    cache: Arc<dyn Cache>,
}

pub fn encode_uid(id: AccountId) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

pub fn decode_uid(uid: &str) -> Option<AccountId> {
    let bytes = URL_SAFE_NO_PAD.decode(uid.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn fingerprint(account: &Account) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.password_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(account.email.to_lowercase().as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

impl VerificationTokenIssuer {
    pub fn new(secret: &str, email_ttl: Duration, reset_ttl: Duration, cache: Arc<dyn Cache>) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            email_ttl,
            reset_ttl,
            cache,
        }
    }

    pub fn ttl(&self, purpose: Purpose) -> Duration {
        match purpose {
            Purpose::EmailVerification => self.email_ttl,
            Purpose::PasswordReset => self.reset_ttl,
        }
    }

    fn mac(&self, purpose: Purpose, uid: &str, expiry: i64, fingerprint: &str) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
        mac.update(format!("{}|{uid}|{expiry}|{fingerprint}", purpose.as_str()).as_bytes());
        mac
    }

    pub fn generate(&self, account: &Account, purpose: Purpose) -> String {
        self.generate_at(account, purpose, Utc::now())
    }

    pub fn generate_at(&self, account: &Account, purpose: Purpose, now: DateTime<Utc>) -> String {
        let uid = encode_uid(account.id);
        let expiry = now.timestamp() + self.ttl(purpose).as_secs() as i64;
        let fingerprint = fingerprint(account);
        let mac = hex::encode(self.mac(purpose, &uid, expiry, &fingerprint).finalize().into_bytes());
        format!("{uid}.{expiry}.{fingerprint}.{mac}")
    }

    /// Check structure and signature; yields the account id to load
    pub fn decode(&self, token: &str, purpose: Purpose) -> Result<VerifiedLink, VerificationError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [uid, expiry, fingerprint, mac] = parts.as_slice() else {
            return Err(VerificationError::Malformed);
        };

        let user_id = decode_uid(uid).ok_or(VerificationError::Malformed)?;
        let expires_at: i64 = expiry.parse().map_err(|_| VerificationError::Malformed)?;
        let mac_bytes = hex::decode(mac).map_err(|_| VerificationError::Malformed)?;

        self.mac(purpose, uid, expires_at, fingerprint)
            .verify_slice(&mac_bytes)
            .map_err(|_| VerificationError::Malformed)?;

        Ok(VerifiedLink {
            user_id,
            purpose,
            expires_at,
            fingerprint: fingerprint.to_string(),
            digest: hex::encode(Sha256::digest(token.trim().as_bytes())),
        })
    }

    pub async fn verify(&self, link: &VerifiedLink, account: &Account) -> Result<(), AppError> {
        self.verify_at(link, account, Utc::now()).await
    }

    /// Consumption, then expiry, then state binding
    pub async fn verify_at(&self, link: &VerifiedLink, account: &Account, now: DateTime<Utc>) -> Result<(), AppError> {
        if link.user_id != account.id {
            return Err(VerificationError::Malformed.into());
        }
        if self.cache.get(&keys::consumed_token(&link.digest)).await?.is_some() {
            return Err(VerificationError::AlreadyConsumed.into());
        }
        if now.timestamp() >= link.expires_at {
            return Err(VerificationError::Expired.into());
        }
        if link.fingerprint != fingerprint(account) {
            return Err(VerificationError::UserStateChanged.into());
        }
        Ok(())
    }

    /// Mark the token used; a concurrent consumer loses with `AlreadyConsumed`
    pub async fn consume(&self, link: &VerifiedLink) -> Result<(), AppError> {
        let remaining = (link.expires_at - Utc::now().timestamp()).max(1) as u64;
        let first = self
            .cache
            .put_if_absent(
                &keys::consumed_token(&link.digest),
                link.purpose.as_str(),
                Duration::from_secs(remaining),
            )
            .await?;
        if first {
            Ok(())
        } else {
            Err(VerificationError::AlreadyConsumed.into())
        }
    }
}

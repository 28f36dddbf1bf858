//! Signed credential encoding and decoding.
//!
//! HS256 tokens carrying the account identity. Expiry is checked with zero
//! leeway against UTC Unix timestamps.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use scholarflow_common::{AccountId, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtSettings;
use crate::models::Account;

/// Token errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid token: {0}")]
    Malformed(String),

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub is_staff: bool,
    pub is_verified: bool,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique token id, the revocation key
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<AccountId, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Malformed("subject is not an account id".to_string()))
    }

    /// Seconds left before expiry, never negative
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(self.exp - now.timestamp()).unwrap_or(0)
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

/// Encodes and decodes signed tokens
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            access_ttl: Duration::seconds(settings.access_ttl_secs as i64),
            refresh_ttl: Duration::seconds(settings.refresh_ttl_secs as i64),
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
        }
    }

    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Build claims for an account, issued at `now`
    pub fn claims_for(&self, account: &Account, token_type: TokenType, now: DateTime<Utc>) -> Claims {
        Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            is_staff: account.is_staff,
            is_verified: account.is_verified,
            token_type,
            iat: now.timestamp(),
            exp: (now + self.ttl(token_type)).timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue(&self, account: &Account, token_type: TokenType) -> Result<SignedToken, TokenError> {
        let claims = self.claims_for(account, token_type, Utc::now());
        let token = self.encode(&claims)?;
        Ok(SignedToken { token, claims })
    }

    /// Verify signature, issuer and expiry
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Decode and require a specific token type
    pub fn decode_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            return Err(TokenError::Malformed(format!(
                "expected {expected} token, got {}",
                claims.token_type
            )));
        }
        Ok(claims)
    }
}

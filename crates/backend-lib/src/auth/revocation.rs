//! Revocation records and credential pair lifecycle.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use scholarflow_common::{AccountId, TokenPair};

use super::jwt::{Claims, TokenCodec, TokenError, TokenType};
use crate::cache::{keys, Cache};
use crate::error::AppError;
use crate::metrics as keys_metrics;
use crate::models::Account;

/// Blacklist of token ids, plus the ids issued to each account
#[derive(Clone)]
pub struct RevocationStore {
    cache: Arc<dyn Cache>,
}

impl RevocationStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Mark a token id revoked for `remaining`. Returns false when it already was.
    pub async fn revoke(&self, jti: &str, remaining: Duration) -> Result<bool, AppError> {
        let fresh = self
            .cache
            .put_if_absent(&keys::blacklisted_token(jti), "1", remaining.max(Duration::from_secs(1)))
            .await?;
        if fresh {
            counter!(keys_metrics::TOKEN_REVOKED).increment(1);
        }
        Ok(fresh)
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        Ok(self.cache.get(&keys::blacklisted_token(jti)).await?.is_some())
    }

    /// Remember an issued token so it can be revoked in bulk
    pub async fn track(&self, user_id: AccountId, claims: &Claims) -> Result<(), AppError> {
        let remaining = Duration::from_secs(claims.remaining_secs(Utc::now()));
        self.cache
            .add_member(
                &keys::user_tokens(user_id),
                &format!("{}:{}", claims.jti, claims.exp),
                remaining,
            )
            .await
    }

    /// Revoke every still-valid token issued to an account
    pub async fn revoke_all_for_user(&self, user_id: AccountId) -> Result<usize, AppError> {
        let now = Utc::now().timestamp();
        let mut revoked = 0;
        for member in self.cache.take_members(&keys::user_tokens(user_id)).await? {
            let Some((jti, exp)) = member.rsplit_once(':') else {
                continue;
            };
            let Ok(exp) = exp.parse::<i64>() else {
                continue;
            };
            if exp <= now {
                continue;
            }
            if self.revoke(jti, Duration::from_secs((exp - now) as u64)).await? {
                revoked += 1;
            }
        }
        tracing::info!(user_id, revoked, "revoked all tokens for account");
        Ok(revoked)
    }
}

/// Issues, checks and rotates credential pairs
#[derive(Clone)]
pub struct TokenManager {
    codec: TokenCodec,
    revocations: RevocationStore,
}

impl TokenManager {
    pub fn new(codec: TokenCodec, revocations: RevocationStore) -> Self {
        Self { codec, revocations }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn issue_pair(&self, account: &Account) -> Result<TokenPair, AppError> {
        let access = self.codec.issue(account, TokenType::Access)?;
        let refresh = self.codec.issue(account, TokenType::Refresh)?;

        self.revocations.track(account.id, &access.claims).await?;
        self.revocations.track(account.id, &refresh.claims).await?;
        counter!(keys_metrics::TOKEN_ISSUED).increment(2);

        Ok(TokenPair {
            access: access.token,
            refresh: refresh.token,
            token_type: "Bearer".to_string(),
            access_expires_in: access.claims.exp - access.claims.iat,
            refresh_expires_in: refresh.claims.exp - refresh.claims.iat,
            user_id: account.id,
            issued_at: access.claims.iat,
        })
    }

    /// Signature, expiry, type, then revocation
    pub async fn authenticate(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let claims = self.codec.decode_as(token, expected)?;
        if self.revocations.is_revoked(&claims.jti).await? {
            counter!(keys_metrics::TOKEN_REJECTED).increment(1);
            tracing::warn!(jti = %claims.jti, sub = %claims.sub, "revoked token presented");
            return Err(TokenError::Revoked.into());
        }
        Ok(claims)
    }

    /// Validate a refresh token and revoke it in one atomic step.
    /// Only the first caller for a given token succeeds.
    pub async fn consume_refresh(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.codec.decode_as(token, TokenType::Refresh)?;
        let remaining = Duration::from_secs(claims.remaining_secs(Utc::now()));
        if !self.revocations.revoke(&claims.jti, remaining).await? {
            counter!(keys_metrics::TOKEN_REJECTED).increment(1);
            tracing::warn!(jti = %claims.jti, sub = %claims.sub, "refresh token reused");
            return Err(TokenError::Revoked.into());
        }
        Ok(claims)
    }

    /// Revoke already-decoded claims; repeated calls are no-ops
    pub async fn revoke(&self, claims: &Claims) -> Result<(), AppError> {
        let remaining = Duration::from_secs(claims.remaining_secs(Utc::now()));
        self.revocations.revoke(&claims.jti, remaining).await?;
        Ok(())
    }

    pub async fn revoke_all_for_user(&self, user_id: AccountId) -> Result<usize, AppError> {
        self.revocations.revoke_all_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::JwtSettings;
    use crate::models::NewAccount;
    use scholarflow_common::Role;

    fn manager() -> TokenManager {
        manager_with(MemoryCache::new(), JwtSettings::default())
    }

    fn manager_with(cache: MemoryCache, jwt: JwtSettings) -> TokenManager {
        let cache: Arc<dyn Cache> = Arc::new(cache);
        TokenManager::new(TokenCodec::new(&jwt), RevocationStore::new(cache))
    }

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
            is_verified: true,
            is_active: true,
            is_staff: false,
        }
        .into_account(3, Utc::now())
    }

    fn is_token_error(result: Result<Claims, AppError>, expected: TokenError) -> bool {
        matches!(result, Err(AppError::Token(e)) if e == expected)
    }

    #[tokio::test]
    async fn test_issue_pair_shapes() {
        let pair = manager().issue_pair(&account()).await.unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.access_expires_in, 900);
        assert_eq!(pair.refresh_expires_in, 1_209_600);
        assert_eq!(pair.user_id, 3);
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let manager = manager();
        let pair = manager.issue_pair(&account()).await.unwrap();

        manager.consume_refresh(&pair.refresh).await.unwrap();
        assert!(is_token_error(
            manager.consume_refresh(&pair.refresh).await,
            TokenError::Revoked
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let manager = manager();
        let pair = manager.issue_pair(&account()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let token = pair.refresh.clone();
            handles.push(tokio::spawn(async move { manager.consume_refresh(&token).await.is_ok() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_revoked_access_token_rejected() {
        let manager = manager();
        let pair = manager.issue_pair(&account()).await.unwrap();

        let claims = manager.authenticate(&pair.access, TokenType::Access).await.unwrap();
        manager.revoke(&claims).await.unwrap();
        manager.revoke(&claims).await.unwrap();

        assert!(is_token_error(
            manager.authenticate(&pair.access, TokenType::Access).await,
            TokenError::Revoked
        ));
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let manager = manager();
        let pair = manager.issue_pair(&account()).await.unwrap();
        assert!(matches!(
            manager.consume_refresh(&pair.access).await,
            Err(AppError::Token(TokenError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let manager = manager();
        let first = manager.issue_pair(&account()).await.unwrap();
        let second = manager.issue_pair(&account()).await.unwrap();

        assert_eq!(manager.revoke_all_for_user(3).await.unwrap(), 4);
        for token in [&first.access, &second.access] {
            assert!(is_token_error(
                manager.authenticate(token, TokenType::Access).await,
                TokenError::Revoked
            ));
        }
        assert!(is_token_error(
            manager.consume_refresh(&second.refresh).await,
            TokenError::Revoked
        ));
    }

    #[tokio::test]
    async fn test_issued_token_index_drops_expired_ids() {
        let cache = MemoryCache::new();
        let jwt = JwtSettings {
            access_ttl_secs: 1,
            ..JwtSettings::default()
        };
        let manager = manager_with(cache.clone(), jwt);

        let mut pairs = Vec::new();
        for _ in 0..3 {
            pairs.push(manager.issue_pair(&account()).await.unwrap());
            tokio::time::sleep(Duration::from_millis(1100)).await;
        }

        let members = cache.take_members(&keys::user_tokens(3)).await.unwrap();
        let now = Utc::now().timestamp();
        for member in &members {
            let (_, exp) = member.rsplit_once(':').unwrap();
            assert!(exp.parse::<i64>().unwrap() > now, "expired id kept: {member}");
        }
        for pair in &pairs {
            let refresh = manager.codec().decode_as(&pair.refresh, TokenType::Refresh).unwrap();
            assert!(members.iter().any(|m| m.starts_with(&format!("{}:", refresh.jti))));
        }
        assert_eq!(members.len(), 3);
    }
}

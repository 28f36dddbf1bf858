// ============================
// crates/backend-lib/src/cache.rs
// ============================
//! Shared keyed cache with per-entry TTL.
//!
//! Holds revocation records, consumed verification links and cooldown
//! markers. The trait keeps the backing store swappable; [`MemoryCache`]
//! serves a single process.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::gauge;

use crate::error::AppError;

/// Key families
pub mod keys {
    use scholarflow_common::AccountId;

    pub fn blacklisted_token(jti: &str) -> String {
        format!("blacklisted_token:{jti}")
    }

    pub fn user_tokens(user_id: AccountId) -> String {
        format!("user_tokens:{user_id}")
    }

    pub fn consumed_token(digest: &str) -> String {
        format!("consumed_token:{digest}")
    }

    pub fn password_reset_rate(email: &str) -> String {
        format!("password_reset_rate:{}", email.to_lowercase())
    }

    pub fn verification_email_rate(user_id: AccountId) -> String {
        format!("verification_email_rate:{user_id}")
    }
}

/// Keyed store with expiry
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store a value, replacing any previous one
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    /// Store a value only if the key is absent or expired.
    /// Returns true when this call wrote the value.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AppError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Returns whether a live entry was removed
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Add a member to the set stored at `key`. The member lives for `ttl`;
    /// expired members are dropped and the set lives as long as its newest one.
    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), AppError>;

    /// Remove the set stored at `key` and return its live members
    async fn take_members(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Remaining lifetime of a live entry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError>;
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    /// Member to its own expiry
    Set(HashMap<String, Instant>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn text(value: &str, ttl: Duration) -> Self {
        Self {
            value: Value::Text(value.to_string()),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that drops expired entries every `interval`
    pub fn start_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "cache sweep");
                }
            }
        });
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let after = self.entries.len();
        gauge!(crate::metrics::CACHE_ENTRIES).set(after as f64);
        before.saturating_sub(after)
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), CacheEntry::text(value, ttl));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(CacheEntry::text(value, ttl));
                    Ok(true)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::text(value, ttl));
                Ok(true)
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.live(key).map(|entry| match entry.value {
            Value::Text(text) => text,
            Value::Set(members) => members.len().to_string(),
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), AppError> {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| CacheEntry {
            value: Value::Set(HashMap::new()),
            expires_at,
        });

        if !entry.is_live(now) || matches!(entry.value, Value::Text(_)) {
            entry.value = Value::Set(HashMap::new());
        }
        let mut latest = expires_at;
        if let Value::Set(members) = &mut entry.value {
            members.retain(|_, member_expiry| now < *member_expiry);
            let slot = members.entry(member.to_string()).or_insert(expires_at);
            *slot = (*slot).max(expires_at);
            latest = members.values().copied().max().unwrap_or(expires_at);
        }
        entry.expires_at = latest;
        Ok(())
    }

    async fn take_members(&self, key: &str) -> Result<Vec<String>, AppError> {
        let now = Instant::now();
        Ok(match self.entries.remove(key) {
            Some((_, entry)) if entry.is_live(now) => match entry.value {
                Value::Set(members) => members
                    .into_iter()
                    .filter(|(_, member_expiry)| now < *member_expiry)
                    .map(|(member, _)| member)
                    .collect(),
                Value::Text(_) => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .map(|entry| entry.expires_at.saturating_duration_since(now)))
    }
}

// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Lockout after repeated failed logins.

use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry in the lockout map
#[derive(Debug, Clone)]
struct LockoutEntry {
    /// Consecutive failed attempts
    failed_attempts: u32,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// When the lockout expires, if locked
    locked_until: Option<Instant>,
}

/// Failed login tracker, keyed by normalised email
#[derive(Debug, Clone)]
pub struct LoginLockout {
    attempts: Arc<DashMap<String, LockoutEntry>>,
    max_attempts: u32,
    lockout_duration: Duration,
    failure_window: Duration,
}

impl LoginLockout {
    /// Failures more than `failure_window` after the previous one restart the count
    pub fn new(max_attempts: u32, lockout_duration: Duration, failure_window: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
            failure_window,
        }
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Record a failed attempt. Returns true if this failure triggered a lockout.
    pub fn record_failed_attempt(&self, email: &str) -> bool {
        let now = Instant::now();

        let mut entry = self.attempts.entry(Self::key(email)).or_insert_with(|| LockoutEntry {
            failed_attempts: 0,
            last_failure: now,
            locked_until: None,
        });

        // Start over once a previous lockout has run out
        if entry.locked_until.is_some_and(|until| now >= until) {
            entry.failed_attempts = 0;
            entry.locked_until = None;
        }
        if entry.locked_until.is_none() && now.duration_since(entry.last_failure) >= self.failure_window {
            entry.failed_attempts = 0;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.locked_until.is_none() {
            entry.locked_until = Some(now + self.lockout_duration);
            counter!(crate::metrics::LOGIN_LOCKOUT).increment(1);
            tracing::warn!(
                email = %Self::key(email),
                attempts = entry.failed_attempts,
                "account locked after repeated failed logins"
            );
            return true;
        }
        false
    }

    /// Clear the counter after a successful login
    pub fn record_success(&self, email: &str) {
        self.attempts.remove(&Self::key(email));
    }

    /// Remaining lockout time, if the email is currently locked
    pub fn locked_for(&self, email: &str) -> Option<Duration> {
        let entry = self.attempts.get(&Self::key(email))?;
        let until = entry.locked_until?;
        until.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
    }

    pub fn is_locked(&self, email: &str) -> bool {
        self.locked_for(email).is_some()
    }

    /// Drop expired lockouts and stale counters
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, entry| match entry.locked_until {
            Some(until) => now < until,
            None => now.duration_since(entry.last_failure) < self.failure_window,
        });
    }
}

// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the ScholarFlow API server.

pub mod accounts;
pub mod auth;
pub mod cache;
pub mod config;
pub mod email;
pub mod error;
pub mod establishments;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod router;
pub mod storage;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use crate::accounts::AccountDirectory;
use crate::auth::rate_limit::LoginLockout;
use crate::auth::{AuthService, DefaultAuth};
use crate::cache::{Cache, MemoryCache};
use crate::config::Settings;
use crate::email::{EmailDispatcher, Mailer};
use crate::establishments::EstablishmentDirectory;
use crate::middleware::RateLimiter;
use crate::storage::{FlatFileStorage, Storage};

pub use crate::router::create_router;

/// Application state shared across all handlers
pub struct AppState {
    /// Settings the server was started with
    pub settings: Arc<Settings>,
    /// Storage backend
    pub storage: Arc<dyn Storage>,
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    pub accounts: AccountDirectory,
    pub establishments: EstablishmentDirectory,
    /// Per-client limiter for the auth routes
    pub rate_limiter: Arc<RateLimiter>,
    /// Set when the state owns an in-process cache that needs sweeping
    memory_cache: Option<MemoryCache>,
    lockout: LoginLockout,
}

impl AppState {
    /// Create a new application state backed by an in-process cache
    pub fn new(settings: Settings, storage: Arc<dyn Storage>, mailer: Arc<dyn Mailer>) -> Self {
        let cache = MemoryCache::new();
        let mut state = Self::with_cache(settings, storage, Arc::new(cache.clone()), mailer);
        state.memory_cache = Some(cache);
        state
    }

    /// Create a new application state over an externally managed cache
    pub fn with_cache(
        settings: Settings,
        storage: Arc<dyn Storage>,
        cache: Arc<dyn Cache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let settings = Arc::new(settings);

        let email = EmailDispatcher::new(mailer, &settings);
        let auth = DefaultAuth::new(Arc::clone(&settings), Arc::clone(&storage), cache, email);
        let lockout = auth.lockout().clone();

        let rate_limiter = Arc::new(
            RateLimiter::new(
                Duration::from_secs(settings.rate_limit.window_secs),
                settings.rate_limit.max_requests,
            )
            .trust_proxy_headers(settings.rate_limit.trust_proxy_headers),
        );

        Self {
            accounts: AccountDirectory::new(Arc::clone(&storage)),
            establishments: EstablishmentDirectory::new(Arc::clone(&storage)),
            auth: Arc::new(auth),
            storage,
            settings,
            rate_limiter,
            memory_cache: None,
            lockout,
        }
    }

    /// Flat-file storage under `data_dir` and the mailer the settings ask for
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(FlatFileStorage::new(&settings.data_dir)?);
        let mailer = EmailDispatcher::mailer_from_settings(&settings)?;
        Ok(Self::new(settings, storage, mailer))
    }

    /// Periodically drop expired cache entries, lockouts and rate windows
    pub fn spawn_maintenance(&self, interval: Duration) {
        if let Some(cache) = &self.memory_cache {
            cache.start_sweeper(interval);
        }

        let lockout = self.lockout.clone();
        let rate_limiter = Arc::clone(&self.rate_limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                lockout.cleanup();
                rate_limiter.cleanup();
            }
        });
    }
}

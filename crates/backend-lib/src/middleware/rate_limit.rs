use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use metrics::counter;

use crate::{error::AppError, AppState};

/// Fixed-window request counter per client
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max_requests: u32,
    trust_proxy_headers: bool,
}

/// Rate limit entry for a client
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max_requests,
            trust_proxy_headers: false,
        }
    }

    /// Key clients on proxy-supplied address headers when present
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Count a request; `Err` carries the seconds until the window resets
    pub fn check(&self, client: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(client.to_string()).or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.requests = 0;
            entry.window_start = now;
        }

        if entry.requests >= self.max_requests {
            let reset_in = self.window.saturating_sub(now.duration_since(entry.window_start));
            return Err(reset_in.as_secs().max(1));
        }

        entry.requests += 1;
        Ok(())
    }

    /// Drop clients whose window has passed
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }
}

/// Socket peer address. Proxy headers are consulted only when trusted,
/// since any client can set them.
fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let headers = request.headers();
        if let Some(ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
            return ip.trim().to_string();
        }
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
        {
            return ip.trim().to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiter middleware
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_key(&request, state.rate_limiter.trust_proxy_headers);

    if let Err(retry_after_secs) = state.rate_limiter.check(&client) {
        counter!(crate::metrics::RATE_LIMITED).increment(1);
        tracing::warn!(%client, path = %request.uri().path(), "rate limit exceeded");
        return Err(AppError::RateLimited { retry_after_secs });
    }

    Ok(next.run(request).await)
}

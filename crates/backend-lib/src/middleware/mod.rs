// crates/backend-lib/src/middleware/mod.rs

//! Request middleware and authentication extractors.

pub mod auth;
pub mod rate_limit;

pub use auth::{ActiveUser, AdminUser, CurrentUser};
pub use rate_limit::{rate_limit, RateLimiter};

#[cfg(test)]
mod tests;

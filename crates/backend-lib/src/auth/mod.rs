// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod revocation;
pub mod token_generator;
pub mod verification;
mod service;
mod service_impl;

pub use jwt::{Claims, TokenCodec, TokenError, TokenType};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use revocation::{RevocationStore, TokenManager};
pub use service::AuthService;
pub use service_impl::DefaultAuth;
pub use verification::{Purpose, VerificationError, VerificationTokenIssuer};

// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
//! Matricule generation.
//!
//! A matricule reads `SF` + four-digit year + six random digits. Uniqueness
//! is enforced by the storage index; callers retry on collision.
use chrono::{Datelike, Utc};
use rand::Rng;

/// Prefix shared by every generated matricule
pub const MATRICULE_PREFIX: &str = "SF";

/// Attempts before registration gives up on finding a free matricule
pub const MAX_MATRICULE_ATTEMPTS: usize = 8;

/// Generate a matricule for the current year
pub fn generate_matricule() -> String {
    generate_matricule_for_year(Utc::now().year())
}

pub fn generate_matricule_for_year(year: i32) -> String {
    let serial: u32 = rand::rng().random_range(0..1_000_000);
    format!("{MATRICULE_PREFIX}{year:04}{serial:06}")
}

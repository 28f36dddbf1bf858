// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing, verification and policy checks.
use scrypt::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Scrypt,
};
use zeroize::Zeroize;

use crate::config::PasswordRequirements;

/// Passwords rejected regardless of complexity
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "p@ssw0rd", "p@ssword1", "passw0rd!",
    "123456", "12345678", "123456789", "1234567890", "qwerty", "qwerty123", "azerty",
    "azerty123", "abc123", "letmein", "welcome1", "welcome123", "admin123", "iloveyou",
    "motdepasse", "changeme", "sunshine1", "football1",
];

/// Shortest email local part considered for similarity checks
const SIMILARITY_MIN_LEN: usize = 4;

/// Hash a password using scrypt with the given cost (log2 of N)
pub fn hash_password(plain: &str, log_n: u8) -> anyhow::Result<String> {
    let params = Params::new(log_n, Params::RECOMMENDED_R, Params::RECOMMENDED_P, Params::RECOMMENDED_LEN)
        .map_err(|e| anyhow::anyhow!("invalid scrypt parameters: {e}"))?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Scrypt
        .hash_password_customized(plain.as_bytes(), None, None, params, &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a hash
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Scrypt.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
}

/// Hash a password and zeroize the original
pub fn hash_password_secure(plain: &mut String, log_n: u8) -> anyhow::Result<String> {
    let hash = hash_password(plain, log_n);
    plain.zeroize();
    hash
}

/// Hash of a random password, verified against when the account does not
/// exist so that response timing does not reveal registered emails
pub fn dummy_hash(log_n: u8) -> anyhow::Result<String> {
    hash_password(&uuid::Uuid::new_v4().to_string(), log_n)
}

/// Check a password against the policy. Returns one message per failed rule.
pub fn validate_password_strength(
    password: &str,
    requirements: &PasswordRequirements,
    email: Option<&str>,
) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < requirements.min_length {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            requirements.min_length
        ));
    }

    if requirements.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        problems.push("Password must contain at least one uppercase letter.".to_string());
    }

    if requirements.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        problems.push("Password must contain at least one lowercase letter.".to_string());
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one digit.".to_string());
    }

    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        problems.push("Password must contain at least one special character.".to_string());
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }

    if let Some(local) = email.and_then(|e| e.split('@').next()) {
        let local = local.to_lowercase();
        if local.len() >= SIMILARITY_MIN_LEN && lowered.contains(&local) {
            problems.push("The password is too similar to the email address.".to_string());
        }
    }

    problems
}

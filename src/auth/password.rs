use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use super::error::CredentialError;

/// Hash a plaintext password with a fresh salt. Argon2id with the crate's
/// default cost parameters, so every stored hash costs the same to check.
pub fn hash_password(plain: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| hash_failure("hash", e))
}

/// `Ok(false)` on mismatch; errors only when `hash` is not a PHC string.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, CredentialError> {
    let stored = PasswordHash::new(hash).map_err(|e| hash_failure("parse stored hash", e))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &stored)
        .is_ok())
}

fn hash_failure(step: &'static str, e: password_hash::Error) -> CredentialError {
    error!(error = %e, step, "argon2 failure");
    CredentialError::Hash(e.to_string())
}

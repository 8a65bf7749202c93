//! Password hashing and validation (Argon2id, PHC string format).

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};

use accord_core::{DomainError, DomainResult};

/// Hash a plain password for storage.
///
/// The salt is generated from OS entropy and embedded in the PHC string.
pub fn hash_password(plain: &str) -> DomainResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| DomainError::validation(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Check a candidate password against a stored hash.
///
/// Verification is constant-time. A mismatch is an `Ok(false)` outcome, not
/// an error; only an unreadable stored hash fails, with `CorruptCredential`.
pub fn verify_password(stored_hash: &str, candidate: &str) -> DomainResult<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| DomainError::CorruptCredential)?;

    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(DomainError::CorruptCredential),
    }
}

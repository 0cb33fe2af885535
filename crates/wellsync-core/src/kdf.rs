//! Password key derivation.
//!
//! Turns the user's encryption password into a 256-bit key with Argon2id —
//! memory-hard, so offline brute force against a stolen envelope stays
//! expensive. Derivation is deterministic for a fixed `(password, salt)`
//! and always succeeds for a valid password; a *wrong* password is only
//! detectable downstream when envelope authentication fails.
//!
//! The salt is generated once per account, is not secret, and is cached
//! locally plus embedded in every envelope so a future session can
//! re-derive the same key from the password alone.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::crypto::{EncryptionKey, SALT_LEN, Salt};
use crate::error::KdfError;

/// Minimum accepted password length, checked before derivation.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Argon2id cost parameters.
///
/// Fixed per deployment — changing them changes every derived key, so they
/// are part of the engine configuration rather than ad-hoc constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations (time cost).
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP-recommended Argon2id baseline: 19 MiB, t=2, p=1.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Check the password length rule without deriving anything.
///
/// Counted in characters, not bytes.
///
/// # Errors
///
/// Returns [`KdfError::PasswordTooShort`] if the password has fewer than
/// [`MIN_PASSWORD_CHARS`] characters.
pub fn validate_length(password: &str) -> Result<(), KdfError> {
    let chars = password.chars().count();
    if chars < MIN_PASSWORD_CHARS {
        return Err(KdfError::PasswordTooShort {
            min: MIN_PASSWORD_CHARS,
            actual: chars,
        });
    }
    Ok(())
}

/// Generate a fresh random per-account salt.
#[must_use]
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the account encryption key from a password and salt.
///
/// Deterministic: the same `(password, salt, params)` always yields the
/// same key.
///
/// # Errors
///
/// - [`KdfError::PasswordTooShort`] if the password has fewer than
///   [`MIN_PASSWORD_CHARS`] characters (checked before any work).
/// - [`KdfError::Derivation`] if the cost parameters are rejected or
///   Argon2 fails internally.
pub fn derive(password: &str, salt: &Salt, params: &KdfParams) -> Result<EncryptionKey, KdfError> {
    validate_length(password)?;

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(EncryptionKey::LEN),
    )
    .map_err(|e| KdfError::Derivation {
        reason: e.to_string(),
    })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; EncryptionKey::LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| KdfError::Derivation {
            reason: e.to_string(),
        })?;

    Ok(EncryptionKey::from_bytes(key))
}

/// Cheap parameters so the test suite doesn't burn CPU on Argon2.
#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

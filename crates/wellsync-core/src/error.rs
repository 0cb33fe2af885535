//! Error types for `wellsync-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include key material or plaintext — only
//! lengths and operation descriptions. A wrong password and a corrupted or
//! tampered envelope are indistinguishable by design: both surface as
//! [`CryptoError::AuthenticationFailure`].

use wellsync_store::{RemoteError, StorageError};

/// Errors from password key derivation.
#[derive(Debug, thiserror::Error)]
pub enum KdfError {
    /// The password failed local validation before derivation was attempted.
    #[error("password too short: need at least {min} characters, got {actual}")]
    PasswordTooShort { min: usize, actual: usize },

    /// Argon2id derivation failed (bad cost parameters or internal error).
    #[error("key derivation failed: {reason}")]
    Derivation { reason: String },
}

/// Errors from the canonical record codec: schema violations, ratings
/// outside `[1, 5]`, and unparseable periods.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The record could not be serialized.
    #[error("record encoding failed: {reason}")]
    Encode { reason: String },

    /// The bytes are not a well-formed record (missing fields, wrong types).
    #[error("malformed record: {reason}")]
    Malformed { reason: String },

    /// A rating is outside the valid `[1, 5]` range.
    #[error("rating {rating} for question '{question}' is outside [1, 5]")]
    RatingOutOfRange { question: String, rating: u8 },

    /// The period is not a valid `YYYY-MM` calendar month.
    #[error("invalid period '{value}': expected YYYY-MM with month 01-12")]
    InvalidPeriod { value: String },
}

/// Errors from envelope seal/open operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// The authentication tag did not verify: wrong password, corrupted
    /// blob, or tampering. This is the sole wrong-password signal — no
    /// plaintext password is ever compared directly.
    #[error("envelope authentication failed (wrong password or corrupted data)")]
    AuthenticationFailure,

    /// The blob is too short to contain salt + nonce + tag.
    #[error("envelope too short: expected at least {expected} bytes, got {actual}")]
    EnvelopeTooShort { expected: usize, actual: usize },

    /// Decrypted bytes failed record decoding.
    #[error("sealed record is malformed: {0}")]
    Codec(#[from] CodecError),
}

/// Errors from the typed local cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache backend failed.
    #[error("cache storage error: {0}")]
    Storage(#[from] StorageError),

    /// A cached record failed to decode. The cache is the sole writer of
    /// its own records, so this indicates on-device corruption.
    #[error("cache codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors from the identity provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider rejected or failed the sign-in attempt.
    #[error("sign-in failed: {reason}")]
    SignInFailed { reason: String },
}

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The command requires a signed-in session.
    #[error("no signed-in session")]
    NotSignedIn,

    /// The command requires an accepted encryption password.
    #[error("encryption password has not been accepted for this session")]
    PasswordNotSet,

    /// The remote store adapter failed (includes bounded-wait timeouts).
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Key derivation or password validation failed.
    #[error("key derivation error: {0}")]
    Kdf(#[from] KdfError),

    /// Seal/open failed. [`CryptoError::AuthenticationFailure`] during
    /// password verification means the password was wrong; during a normal
    /// pass it means remote corruption.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The local cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The identity provider failed.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

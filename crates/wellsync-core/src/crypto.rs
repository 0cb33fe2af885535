//! Authenticated record encryption.
//!
//! Records cross the trust boundary only as [`CipherEnvelope`]s: AES-256-GCM
//! over the codec's canonical bytes, fresh random 96-bit nonce per seal,
//! 128-bit authentication tag. The envelope carries the key-derivation salt
//! so any future session can re-derive the key from the password alone.
//!
//! # Security model
//!
//! - The key lives only in process memory and zeroizes on drop.
//! - Nonces are never reused for a given key (fresh `OsRng` draw per seal).
//! - A failed tag check surfaces as [`CryptoError::AuthenticationFailure`];
//!   wrong password, corruption, and tampering are indistinguishable by
//!   design and this is the only wrong-password signal in the system.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec;
use crate::error::CryptoError;
use crate::record::AssessmentRecord;

/// Key-derivation salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-256-GCM (128 bits).
pub const TAG_LEN: usize = 16;

/// Minimum envelope length: salt + nonce + tag with empty ciphertext.
const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Per-account key-derivation salt. Random, not secret.
pub type Salt = [u8; SALT_LEN];

/// A 256-bit encryption key that is zeroized on drop.
///
/// Derived from the account password, bound to one session, never
/// persisted. The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; Self::LEN]);

impl EncryptionKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random key from the OS CSPRNG (test fixtures).
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care — the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The encrypted, tamper-evident form of a record as stored remotely.
///
/// Wire layout: `salt (16) || nonce (12) || ciphertext || tag (16)`.
/// Opaque to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    /// Key-derivation salt used for the sealing key.
    pub salt: Salt,
    /// Per-seal random nonce.
    pub nonce: [u8; NONCE_LEN],
    /// AES-256-GCM ciphertext (tag stripped).
    pub ciphertext: Vec<u8>,
    /// Authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl CipherEnvelope {
    /// Serialize to the wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(MIN_ENVELOPE_LEN.saturating_add(self.ciphertext.len()));
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EnvelopeTooShort`] if `bytes` cannot hold
    /// salt + nonce + tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let too_short = || CryptoError::EnvelopeTooShort {
            expected: MIN_ENVELOPE_LEN,
            actual: bytes.len(),
        };
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(too_short());
        }

        let (salt_bytes, rest) = bytes.split_at(SALT_LEN);
        let (nonce_bytes, rest) = rest.split_at(NONCE_LEN);
        let (ciphertext, tag_bytes) = rest.split_at(rest.len().saturating_sub(TAG_LEN));

        Ok(Self {
            salt: salt_bytes.try_into().map_err(|_| too_short())?,
            nonce: nonce_bytes.try_into().map_err(|_| too_short())?,
            ciphertext: ciphertext.to_vec(),
            tag: tag_bytes.try_into().map_err(|_| too_short())?,
        })
    }
}

/// Seal a record into an envelope under the given key.
///
/// Encodes the record canonically, encrypts with a fresh random nonce, and
/// embeds `salt` so the key can be re-derived later.
///
/// # Errors
///
/// Returns a [`CryptoError::Codec`] if the record fails validation, or
/// [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn seal(
    record: &AssessmentRecord,
    key: &EncryptionKey,
    salt: &Salt,
) -> Result<CipherEnvelope, CryptoError> {
    let plaintext = codec::encode(record).map_err(CryptoError::Codec)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    // aes-gcm appends the tag to the ciphertext; split it back out.
    let split = sealed.len().saturating_sub(TAG_LEN);
    let (ciphertext, tag_bytes) = sealed.split_at(split);
    let tag: [u8; TAG_LEN] = tag_bytes.try_into().map_err(|_| CryptoError::Encryption {
        reason: "AEAD output shorter than tag".to_owned(),
    })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);

    Ok(CipherEnvelope {
        salt: *salt,
        nonce: nonce_bytes,
        ciphertext: ciphertext.to_vec(),
        tag,
    })
}

/// Open an envelope, verifying the tag and decoding the record.
///
/// # Errors
///
/// - [`CryptoError::AuthenticationFailure`] if the tag does not verify
///   (wrong password, corrupted blob, or tampering).
/// - [`CryptoError::Codec`] if the decrypted bytes fail record decoding.
pub fn open(envelope: &CipherEnvelope, key: &EncryptionKey) -> Result<AssessmentRecord, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&envelope.nonce);

    let mut sealed =
        Vec::with_capacity(envelope.ciphertext.len().saturating_add(TAG_LEN));
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(&envelope.tag);

    let plaintext = cipher
        .decrypt(nonce, sealed.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    codec::decode(&plaintext).map_err(CryptoError::Codec)
}

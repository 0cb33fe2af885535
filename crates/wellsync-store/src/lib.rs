//! Storage abstractions for `WellSync`.
//!
//! This crate defines two seams and knows nothing about assessment records,
//! encryption, or sync policy:
//!
//! - [`CacheBackend`] — a durable key-value store for the on-device cache:
//!   point get/put plus a prefix scan for the per-account record listing.
//!   Values here are plaintext record bytes; the cache is device-local and
//!   never leaves the machine.
//! - [`RemoteStore`] — the thin adapter over the cloud document store.
//!   Values here are opaque cipher envelopes addressed by `(owner, period)`;
//!   this layer must never learn record content.
//!
//! Implementations provided:
//!
//! - [`MemoryBackend`] / [`MemoryRemote`] — in-memory, for tests
//! - [`RedbCache`] — durable pure-Rust cache backend (feature `redb-backend`)

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_cache;
mod remote;

pub use error::{RemoteError, StorageError};
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_cache::RedbCache;
pub use remote::{MemoryRemote, RemoteStore};

/// A pluggable durable key-value backend for the local cache.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g.
/// `wellness/alice/record/2024-03`). Values are opaque byte arrays. Writes
/// must be durable before the call returns — a record saved immediately
/// before the process exits has to survive.
///
/// The surface is exactly what the record cache needs: point reads and
/// writes for single records and the salt, and one prefix scan that backs
/// the per-account record listing. Records are never deleted — a cleared
/// month is a record with no ratings.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// The write is committed durably before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// All entries whose key starts with `prefix`, ascending by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Scan`] if the underlying backend fails.
    async fn scan_prefix(&self, prefix: &str)
    -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

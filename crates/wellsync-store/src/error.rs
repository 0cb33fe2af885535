//! Storage and remote-adapter error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. None of them ever contain record plaintext or key
//! material — values at this layer are opaque bytes.

/// Errors from local cache backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open the cache backend at the given path.
    #[error("failed to open cache at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read a value.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a value.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to scan entries under the given prefix.
    #[error("failed to scan prefix '{prefix}': {reason}")]
    Scan { prefix: String, reason: String },

    /// A required table was not found or could not be created.
    #[error("missing table '{name}'")]
    MissingTable { name: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },
}

/// Errors from the remote document store adapter.
///
/// The adapter performs no retries — retry policy belongs to the sync
/// engine, which maps these onto its own state transitions.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The identity session is missing or no longer valid.
    #[error("not authenticated with the remote store")]
    NotAuthenticated,

    /// Transport failure (including bounded-wait timeouts imposed by the
    /// caller).
    #[error("remote store unreachable: {reason}")]
    Network { reason: String },
}

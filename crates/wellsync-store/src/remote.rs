//! Remote document store adapter.
//!
//! The remote side of the sync pair: an account-scoped blob store addressed
//! by `(owner, period)`. Blobs are cipher envelopes produced above this
//! layer — the store holds and returns them untouched and learns nothing
//! about record content or save timing beyond what is needed to address a
//! blob.
//!
//! The adapter is deliberately thin: no retries, no caching, no policy.
//! All calls require an active authenticated session provided externally.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::RemoteError;

/// The cloud document store, addressed by `(owner, period)`.
///
/// `period` is the `"YYYY-MM"` wire form of a calendar month. An upload is
/// atomic per period: a concurrent reader sees either the previous envelope
/// or the new one, never a partial write.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Store an envelope for `(owner, period)`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotAuthenticated`] without an active session,
    /// or [`RemoteError::Network`] on transport failure.
    async fn upload(&self, owner: &str, period: &str, envelope: &[u8]) -> Result<(), RemoteError>;

    /// Fetch the envelope for `(owner, period)`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotAuthenticated`] without an active session,
    /// or [`RemoteError::Network`] on transport failure.
    async fn download(&self, owner: &str, period: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// List the periods for which `owner` has stored envelopes, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotAuthenticated`] without an active session,
    /// or [`RemoteError::Network`] on transport failure.
    async fn list_periods(&self, owner: &str) -> Result<Vec<String>, RemoteError>;
}

/// In-memory remote store double for engine tests.
///
/// Behaves like a healthy remote by default. Tests flip
/// [`set_authenticated`](MemoryRemote::set_authenticated) and
/// [`set_online`](MemoryRemote::set_online) to inject auth and transport
/// failures, and read [`upload_count`](MemoryRemote::upload_count) to assert
/// that a reconciliation pass did (or did not) write.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    docs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    authenticated: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
    uploads: Arc<AtomicU64>,
}

impl MemoryRemote {
    /// Create a new remote double with an active session and connectivity.
    #[must_use]
    pub fn new() -> Self {
        let remote = Self::default();
        remote.authenticated.store(true, Ordering::SeqCst);
        remote.online.store(true, Ordering::SeqCst);
        remote
    }

    /// Toggle whether calls carry a valid session.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Toggle transport availability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of uploads accepted since creation.
    #[must_use]
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RemoteError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::Network {
                reason: "connection refused".to_owned(),
            });
        }
        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(RemoteError::NotAuthenticated);
        }
        Ok(())
    }

    fn doc_key(owner: &str, period: &str) -> String {
        format!("{owner}/{period}")
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemote {
    async fn upload(&self, owner: &str, period: &str, envelope: &[u8]) -> Result<(), RemoteError> {
        self.check()?;
        let mut docs = self.docs.write().await;
        docs.insert(Self::doc_key(owner, period), envelope.to_vec());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download(&self, owner: &str, period: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.check()?;
        let docs = self.docs.read().await;
        Ok(docs.get(&Self::doc_key(owner, period)).cloned())
    }

    async fn list_periods(&self, owner: &str) -> Result<Vec<String>, RemoteError> {
        self.check()?;
        let prefix = format!("{owner}/");
        let docs = self.docs.read().await;
        let periods = docs
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k[prefix.len()..].to_owned())
            .collect();
        Ok(periods)
    }
}

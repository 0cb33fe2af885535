//! Durable on-device record cache.
//!
//! The cache exclusively owns the plaintext copy of every record on this
//! device. Keys are namespaced per account so multiple accounts on one
//! device do not collide:
//!
//! - `wellness/{owner}/record/{period}` — one plaintext record
//! - `wellness/{owner}/salt` — the cached account salt (not secret)
//!
//! Writes go straight to the backend, which commits durably before
//! returning. Nothing here ever waits on the network.

use std::sync::Arc;

use tokio::sync::Mutex;
use wellsync_store::CacheBackend;

use crate::codec;
use crate::crypto::{SALT_LEN, Salt};
use crate::error::CacheError;
use crate::record::{AssessmentRecord, OwnerId, Period};

const KEY_ROOT: &str = "wellness";

fn record_key(owner: &OwnerId, period: Period) -> String {
    format!("{KEY_ROOT}/{owner}/record/{period}")
}

fn record_prefix(owner: &OwnerId) -> String {
    format!("{KEY_ROOT}/{owner}/record/")
}

fn salt_key(owner: &OwnerId) -> String {
    format!("{KEY_ROOT}/{owner}/salt")
}

/// Typed record cache over a [`CacheBackend`].
#[derive(Clone)]
pub struct LocalCache {
    backend: Arc<dyn CacheBackend>,
    /// Serializes read-bump-write record updates; clones share the gate.
    write_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Wrap a cache backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Save a record, overwriting any existing one for the same
    /// `(owner, period)` and bumping the revision past it.
    ///
    /// Returns the stored copy (with the bumped revision). Concurrent puts
    /// for the same cache serialize, so two racing saves cannot both store
    /// the same revision.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Codec`] if the record fails validation or
    /// [`CacheError::Storage`] if the backend fails.
    pub async fn put(&self, record: &AssessmentRecord) -> Result<AssessmentRecord, CacheError> {
        let _gate = self.write_gate.lock().await;
        let existing = self.get(&record.owner, record.period).await?;
        let mut stored = record.clone();
        stored.revision = existing.map_or(1, |r| r.revision.saturating_add(1));

        let bytes = codec::encode(&stored)?;
        self.backend
            .put(&record_key(&stored.owner, stored.period), &bytes)
            .await?;
        Ok(stored)
    }

    /// Write a record verbatim, preserving its revision and timestamp.
    ///
    /// Used by the reconciler when a pulled remote copy wins — the remote
    /// revision must survive unchanged or the next comparison would see a
    /// phantom local edit.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Codec`] if the record fails validation or
    /// [`CacheError::Storage`] if the backend fails.
    pub async fn adopt(&self, record: &AssessmentRecord) -> Result<(), CacheError> {
        let _gate = self.write_gate.lock().await;
        let bytes = codec::encode(record)?;
        self.backend
            .put(&record_key(&record.owner, record.period), &bytes)
            .await?;
        Ok(())
    }

    /// Fetch the record for `(owner, period)`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the backend fails, or
    /// [`CacheError::Codec`] if the cached bytes are corrupt.
    pub async fn get(
        &self,
        owner: &OwnerId,
        period: Period,
    ) -> Result<Option<AssessmentRecord>, CacheError> {
        match self.backend.get(&record_key(owner, period)).await? {
            None => Ok(None),
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
        }
    }

    /// List all of an owner's records, newest period first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the backend fails, or
    /// [`CacheError::Codec`] if any cached record is corrupt.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<AssessmentRecord>, CacheError> {
        let entries = self.backend.scan_prefix(&record_prefix(owner)).await?;
        let mut records = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            records.push(codec::decode(&bytes)?);
        }
        records.sort_by(|a, b| b.period.cmp(&a.period));
        Ok(records)
    }

    /// Cache the account salt for future sessions.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the backend fails.
    pub async fn put_salt(&self, owner: &OwnerId, salt: &Salt) -> Result<(), CacheError> {
        self.backend.put(&salt_key(owner), salt).await?;
        Ok(())
    }

    /// Fetch the cached account salt, if one is stored.
    ///
    /// A cached value of the wrong length is ignored rather than surfaced —
    /// the salt can always be recovered from a remote envelope or
    /// regenerated for a brand-new account.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the backend fails.
    pub async fn get_salt(&self, owner: &OwnerId) -> Result<Option<Salt>, CacheError> {
        let bytes = self.backend.get(&salt_key(owner)).await?;
        Ok(bytes.and_then(|b| <[u8; SALT_LEN]>::try_from(b.as_slice()).ok()))
    }
}

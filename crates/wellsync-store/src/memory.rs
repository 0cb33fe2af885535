//! In-memory cache backend for testing.
//!
//! Stores all data in a `BTreeMap` behind a `RwLock`. Nothing is persisted —
//! use this in unit and integration tests where a real backend is needed
//! without touching disk.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{CacheBackend, StorageError};

/// An in-memory cache backend backed by a `BTreeMap`.
///
/// Thread-safe and async-compatible; clones share state. Keys stay sorted,
/// so a prefix scan is a bounded range walk rather than a full traversal.
///
/// # Examples
///
/// ```
/// # use wellsync_store::{MemoryBackend, CacheBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("wellness/alice/salt", b"bytes").await.unwrap();
/// let val = backend.get("wellness/alice/salt").await.unwrap();
/// assert_eq!(val, Some(b"bytes".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let data = self.data.read().await;
        let entries = data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let backend = MemoryBackend::new();
        let result = backend.get("wellness/nobody/salt").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let backend = MemoryBackend::new();
        backend.put("wellness/alice/salt", b"hello").await.unwrap();
        let val = backend.get("wellness/alice/salt").await.unwrap();
        assert_eq!(val, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let backend = MemoryBackend::new();
        backend.put("key", b"v1").await.unwrap();
        backend.put("key", b"v2").await.unwrap();
        let val = backend.get("key").await.unwrap();
        assert_eq!(val, Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn scan_returns_entries_scoped_per_owner() {
        let backend = MemoryBackend::new();
        backend
            .put("wellness/alice/record/2024-02", b"1")
            .await
            .unwrap();
        backend
            .put("wellness/alice/record/2024-03", b"2")
            .await
            .unwrap();
        backend
            .put("wellness/bob/record/2024-03", b"3")
            .await
            .unwrap();

        let entries = backend.scan_prefix("wellness/alice/record/").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("wellness/alice/record/2024-02".to_owned(), b"1".to_vec()),
                ("wellness/alice/record/2024-03".to_owned(), b"2".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn scan_excludes_sibling_keys_under_the_owner() {
        let backend = MemoryBackend::new();
        backend
            .put("wellness/alice/record/2024-03", b"r")
            .await
            .unwrap();
        backend.put("wellness/alice/salt", b"s").await.unwrap();

        let entries = backend.scan_prefix("wellness/alice/record/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "wellness/alice/record/2024-03");
    }

    #[tokio::test]
    async fn scan_no_matches_returns_empty() {
        let backend = MemoryBackend::new();
        backend.put("wellness/alice/salt", b"1").await.unwrap();
        let entries = backend.scan_prefix("wellness/bob/").await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.put("key", b"val").await.unwrap();
        let val = clone.get("key").await.unwrap();
        assert_eq!(val, Some(b"val".to_vec()));
    }
}

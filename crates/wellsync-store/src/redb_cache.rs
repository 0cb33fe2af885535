//! Durable redb cache backend.
//!
//! The on-device record cache has to survive the session ending right after
//! a save, so every write commits its transaction before returning. redb is
//! pure Rust (no C++ FFI) and transactional, which fits a client-side cache.
//! Feature-gated behind `redb-backend`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::{CacheBackend, StorageError};

/// The single table used for all cached data.
/// Key namespacing (owner, record/salt) is handled above this layer.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache");

fn txn_err(e: impl fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn table_err(e: impl fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("cache: {e}"),
    }
}

/// A durable cache backend backed by redb.
///
/// Thread-safe via `Arc<Database>`. redb's transactions are synchronous, so
/// each operation runs on the Tokio blocking thread pool.
///
/// # Examples
///
/// ```no_run
/// # use wellsync_store::RedbCache;
/// let cache = RedbCache::open("/home/user/.local/share/wellsync/cache.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbCache {
    db: Arc<Database>,
    path: PathBuf,
}

impl fmt::Debug for RedbCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbCache {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// database file, or [`StorageError::Transaction`] /
    /// [`StorageError::MissingTable`] if the data table cannot be set up.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // First open of a fresh file: materialize the table up front so
        // reads never race its creation.
        let txn = db.begin_write().map_err(txn_err)?;
        txn.open_table(DATA_TABLE).map(drop).map_err(table_err)?;
        txn.commit().map_err(txn_err)?;

        debug!(path = %path.display(), "opened redb cache");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_value(db: &Database, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(DATA_TABLE).map_err(table_err)?;
        let value = table.get(key).map_err(|e| StorageError::Read {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn write_value(db: &Database, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(DATA_TABLE).map_err(table_err)?;
            table.insert(key, value).map_err(|e| StorageError::Write {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;
        }
        // Commit before returning — the durability contract of the cache.
        txn.commit().map_err(txn_err)
    }

    fn scan_values(
        db: &Database,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let scan_err = |reason: String| StorageError::Scan {
            prefix: prefix.to_owned(),
            reason,
        };
        let txn = db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(DATA_TABLE).map_err(table_err)?;

        let mut entries = Vec::new();
        for item in table.range(prefix..).map_err(|e| scan_err(e.to_string()))? {
            let (key, value) = item.map_err(|e| scan_err(e.to_string()))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            entries.push((key.value().to_owned(), value.value().to_vec()));
        }
        Ok(entries)
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::Transaction {
                reason: format!("blocking task failed: {e}"),
            })?
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedbCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.run_blocking(move |db| Self::read_value(db, &key)).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.run_blocking(move |db| Self::write_value(db, &key, &value))
            .await
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let prefix = prefix.to_owned();
        self.run_blocking(move |db| Self::scan_values(db, &prefix))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_db_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "wellsync-redb-test-{name}-{}.redb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn put_get_survives_reopen() {
        let path = temp_db_path("reopen");
        {
            let cache = RedbCache::open(&path).unwrap();
            cache
                .put("wellness/alice/record/2024-03", b"record")
                .await
                .unwrap();
        }
        let cache = RedbCache::open(&path).unwrap();
        let val = cache.get("wellness/alice/record/2024-03").await.unwrap();
        assert_eq!(val, Some(b"record".to_vec()));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let path = temp_db_path("overwrite");
        let cache = RedbCache::open(&path).unwrap();
        cache.put("wellness/alice/salt", b"old").await.unwrap();
        cache.put("wellness/alice/salt", b"new").await.unwrap();
        assert_eq!(
            cache.get("wellness/alice/salt").await.unwrap(),
            Some(b"new".to_vec())
        );
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn scan_stops_at_prefix_boundary() {
        let path = temp_db_path("scan");
        let cache = RedbCache::open(&path).unwrap();
        cache
            .put("wellness/alice/record/2024-01", b"1")
            .await
            .unwrap();
        cache.put("wellness/alice/salt", b"s").await.unwrap();
        cache
            .put("wellness/bob/record/2024-01", b"2")
            .await
            .unwrap();

        let entries = cache.scan_prefix("wellness/alice/record/").await.unwrap();
        assert_eq!(
            entries,
            vec![("wellness/alice/record/2024-01".to_owned(), b"1".to_vec())]
        );
        let _ = std::fs::remove_file(&path);
    }
}

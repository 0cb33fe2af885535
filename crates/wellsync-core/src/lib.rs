//! Client-side encrypted sync for monthly self-care assessment records.
//!
//! Records are plaintext only on the device: a password-derived AES-256-GCM
//! key seals each record into an opaque envelope before it reaches the
//! remote store, and the password (and key) never leave process memory.
//! The [`engine::SyncEngine`] keeps a durable local cache and the remote
//! collection reconciled with last-writer-wins semantics, offline-first.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use wellsync_core::{EngineConfig, LocalCache, SyncEngine};
//! use wellsync_core::identity::StaticIdentity;
//! use wellsync_store::{MemoryBackend, MemoryRemote};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new(
//!     LocalCache::new(Arc::new(MemoryBackend::new())),
//!     Arc::new(MemoryRemote::new()),
//!     Arc::new(StaticIdentity::new("alice")),
//!     EngineConfig::default(),
//! );
//!
//! engine.sign_in().await?;
//! engine.submit_password("correct-horse").await?;
//!
//! let mut ratings = BTreeMap::new();
//! ratings.insert("sleep_1".to_owned(), 4);
//! engine.save("2024-03".parse()?, ratings).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod record;

pub use cache::LocalCache;
pub use config::EngineConfig;
pub use crypto::{CipherEnvelope, EncryptionKey, Salt};
pub use engine::{SyncEngine, SyncState, SyncStatus};
pub use error::{CacheError, CodecError, CryptoError, EngineError, IdentityError, KdfError};
pub use kdf::KdfParams;
pub use record::{AssessmentRecord, OwnerId, Period};

//! Engine configuration.
//!
//! One explicit value passed to the engine at construction — no ambient
//! globals. Nonce and tag lengths are fixed properties of AES-256-GCM and
//! live as constants in [`crate::crypto`] rather than here.

use std::time::Duration;

use crate::kdf::KdfParams;

/// Configuration for a [`crate::engine::SyncEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Argon2id cost parameters. Fixed per deployment — changing them
    /// changes every derived key.
    pub kdf: KdfParams,
    /// How long after a local save before the scoped push pass runs.
    /// Batches rapid-fire quiz edits into one upload.
    pub sync_debounce: Duration,
    /// Bounded wait applied to every remote call; elapsing maps to a
    /// network-unavailable error.
    pub network_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            sync_debounce: Duration::from_secs(2),
            network_timeout: Duration::from_secs(10),
        }
    }
}

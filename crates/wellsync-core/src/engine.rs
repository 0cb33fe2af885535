//! Sync engine state machine.
//!
//! Orchestrates the signed-in session, password acceptance, and the
//! local/remote reconciliation passes. The engine is the sole writer to the
//! remote store and the sole reconciler between the two copies; quiz-driven
//! local saves land in the cache immediately and never wait on the network.
//!
//! State machine:
//!
//! ```text
//! SignedOut → Authenticating → PasswordRequired → Synced ⇄ Syncing
//!                                                  Syncing → SyncError
//!                 any → Offline (connectivity loss, key survives)
//!                 Offline → Syncing (connectivity restored)
//!                 any → SignedOut (sign-out, key discarded immediately)
//! ```
//!
//! Passes are serialized: at most one in flight, later triggers coalesce
//! into a single follow-up pass. A pass still running at sign-out is
//! abandoned via a session epoch check — its result is discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use wellsync_store::{RemoteError, RemoteStore};

use crate::cache::LocalCache;
use crate::config::EngineConfig;
use crate::crypto::{self, CipherEnvelope, EncryptionKey, Salt};
use crate::error::{CryptoError, EngineError};
use crate::identity::IdentityProvider;
use crate::kdf;
use crate::record::{AssessmentRecord, OwnerId, Period};

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// No session. Local data remains readable through a fresh sign-in.
    SignedOut,
    /// Waiting on the external identity provider.
    Authenticating,
    /// Identity established; the encryption password has not been accepted.
    PasswordRequired,
    /// Local and remote copies reconciled as of the last pass.
    Synced,
    /// A reconciliation pass is in flight.
    Syncing,
    /// Connectivity lost. Local reads and writes keep working; a resync is
    /// queued for when connectivity returns.
    Offline,
    /// The last pass failed. Cleared by the next successful pass.
    SyncError,
}

/// A state change plus its human-readable label, for the UI status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Current engine state.
    pub state: SyncState,
    /// Display string, e.g. "Syncing…" or "Wrong password".
    pub message: String,
}

/// Which periods a pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassScope {
    /// Only periods touched by pending local writes (debounced save path).
    Dirty,
    /// The union of local and remote periods.
    Full,
}

/// Mutable session state, guarded by one mutex.
struct Session {
    owner: Option<OwnerId>,
    key: Option<EncryptionKey>,
    salt: Option<Salt>,
    state: SyncState,
    online: bool,
    /// Periods with local writes not yet confirmed pushed.
    dirty: BTreeSet<Period>,
    /// A trigger arrived while a pass was running; run one more.
    follow_up: bool,
    /// Bumped on sign-out; in-flight passes compare and abandon.
    epoch: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            owner: None,
            key: None,
            salt: None,
            state: SyncState::SignedOut,
            online: true,
            dirty: BTreeSet::new(),
            follow_up: false,
            epoch: 0,
        }
    }
}

/// The sync engine. One per device; holds the only in-memory copy of the
/// encryption key, scoped to the signed-in session.
///
/// Cheap to clone — clones share the same session, so a UI task and the
/// debounced background pass see one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    config: EngineConfig,
    session: Mutex<Session>,
    /// Serializes reconciliation passes; `try_lock` failure means one is
    /// already running and the trigger coalesces.
    pass_gate: Mutex<()>,
    status_tx: watch::Sender<SyncStatus>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine").finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine over the given cache, remote store, and identity
    /// provider.
    #[must_use]
    pub fn new(
        cache: LocalCache,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        config: EngineConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus {
            state: SyncState::SignedOut,
            message: "Signed out".to_owned(),
        });
        Self {
            inner: Arc::new(EngineInner {
                cache,
                remote,
                identity,
                config,
                session: Mutex::new(Session::new()),
                pass_gate: Mutex::new(()),
                status_tx,
            }),
        }
    }

    /// Subscribe to state changes and status strings.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Current engine state.
    pub async fn state(&self) -> SyncState {
        self.inner.session.lock().await.state
    }

    /// Sign in via the external identity provider.
    ///
    /// On success the engine moves to [`SyncState::PasswordRequired`] —
    /// the encryption key is never carried over from a previous session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Identity`] if the provider rejects the
    /// attempt (the engine returns to [`SyncState::SignedOut`]), or
    /// [`EngineError::Cache`] if the cached salt cannot be read.
    pub async fn sign_in(&self) -> Result<(), EngineError> {
        {
            let mut session = self.inner.session.lock().await;
            if session.owner.is_some() {
                return Ok(());
            }
            self.publish(&mut session, SyncState::Authenticating, "Signing in…");
        }

        match self.inner.identity.sign_in().await {
            Ok(owner) => {
                let cached_salt = self.inner.cache.get_salt(&owner).await?;
                let mut session = self.inner.session.lock().await;
                info!(%owner, "signed in, awaiting encryption password");
                session.owner = Some(owner);
                session.salt = cached_salt;
                self.publish(
                    &mut session,
                    SyncState::PasswordRequired,
                    "Encryption password required",
                );
                Ok(())
            }
            Err(e) => {
                let mut session = self.inner.session.lock().await;
                self.publish(&mut session, SyncState::SignedOut, "Sign-in failed");
                Err(e.into())
            }
        }
    }

    /// Submit the encryption password.
    ///
    /// Salt resolution order: locally cached salt, then the salt embedded
    /// in an existing remote envelope, then a fresh random salt for a
    /// brand-new account. With existing remote records the password is
    /// accepted iff at least one envelope opens under the derived key;
    /// otherwise the engine stays in [`SyncState::PasswordRequired`] and
    /// mutates nothing. On acceptance one full reconciliation pass runs.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Kdf`] if the password fails local validation.
    /// - [`EngineError::Crypto`] with
    ///   [`CryptoError::AuthenticationFailure`] if every existing remote
    ///   record rejects the derived key — the wrong-password condition.
    /// - [`EngineError::Remote`] if the remote store cannot be reached;
    ///   the password is neither accepted nor rejected.
    pub async fn submit_password(&self, password: &str) -> Result<(), EngineError> {
        let (owner, cached_salt) = {
            let session = self.inner.session.lock().await;
            let owner = session.owner.clone().ok_or(EngineError::NotSignedIn)?;
            if session.key.is_some() {
                return Ok(());
            }
            (owner, session.salt)
        };

        // Cheap local validation before touching the network or Argon2.
        kdf::validate_length(password)?;

        let periods = self
            .bounded(self.inner.remote.list_periods(owner.as_str()))
            .await?;

        let mut salt = cached_salt;
        let mut key: Option<EncryptionKey> = None;
        let mut verified = false;

        for period in &periods {
            let Some(blob) = self.bounded(self.inner.remote.download(owner.as_str(), period)).await?
            else {
                continue;
            };
            let envelope = CipherEnvelope::from_bytes(&blob)?;
            let candidate_salt = *salt.get_or_insert(envelope.salt);
            let candidate_key = match &key {
                Some(k) => k.clone(),
                None => {
                    let k = kdf::derive(password, &candidate_salt, &self.inner.config.kdf)?;
                    key = Some(k.clone());
                    k
                }
            };
            match crypto::open(&envelope, &candidate_key) {
                Ok(_) => {
                    verified = true;
                    break;
                }
                Err(CryptoError::AuthenticationFailure) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if key.is_some() && !verified {
            // Every existing remote record failed authentication.
            let mut session = self.inner.session.lock().await;
            warn!("encryption password rejected: no remote record authenticated");
            self.publish(&mut session, SyncState::PasswordRequired, "Wrong password");
            return Err(EngineError::Crypto(CryptoError::AuthenticationFailure));
        }

        // Brand-new account (or nothing left to verify against): nothing to
        // check the password with, so a fresh salt seals all future records.
        let salt = match salt {
            Some(salt) => salt,
            None => kdf::generate_salt(),
        };
        let key = match key {
            Some(key) => key,
            None => kdf::derive(password, &salt, &self.inner.config.kdf)?,
        };

        self.inner.cache.put_salt(&owner, &salt).await?;
        {
            let mut session = self.inner.session.lock().await;
            session.key = Some(key);
            session.salt = Some(salt);
            self.publish(&mut session, SyncState::Synced, "Synced");
        }
        info!(%owner, "encryption password accepted");

        self.run_pass(PassScope::Full).await
    }

    /// Cancel the password prompt. The derived key (if any) is discarded;
    /// the session stays signed in with sync disabled.
    pub async fn cancel_password(&self) {
        let mut session = self.inner.session.lock().await;
        session.key = None;
        if session.owner.is_some() {
            self.publish(
                &mut session,
                SyncState::PasswordRequired,
                "Sync disabled until the encryption password is entered",
            );
        }
    }

    /// Save a record locally and schedule a debounced push.
    ///
    /// The cache write is durable before this returns and is independent of
    /// sync state — working offline or before password entry loses nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotSignedIn`] without a session, or
    /// [`EngineError::Cache`] if validation or the cache write fails.
    pub async fn save(
        &self,
        period: Period,
        ratings: BTreeMap<String, u8>,
    ) -> Result<AssessmentRecord, EngineError> {
        let owner = {
            let session = self.inner.session.lock().await;
            session.owner.clone().ok_or(EngineError::NotSignedIn)?
        };

        let record = AssessmentRecord::new(owner, period, ratings);
        let stored = self.inner.cache.put(&record).await?;
        debug!(%period, revision = stored.revision, "record saved locally");

        let should_sync = {
            let mut session = self.inner.session.lock().await;
            session.dirty.insert(period);
            session.key.is_some() && session.online
        };
        // Scheduled even while a pass is running: the debounced pass then
        // fails the gate and coalesces into that pass's follow-up.
        if should_sync {
            self.schedule_debounced_sync();
        }
        Ok(stored)
    }

    /// Read a record from the local cache. Never touches the network.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotSignedIn`] without a session, or
    /// [`EngineError::Cache`] if the cache read fails.
    pub async fn load(&self, period: Period) -> Result<Option<AssessmentRecord>, EngineError> {
        let session = self.inner.session.lock().await;
        let owner = session.owner.clone().ok_or(EngineError::NotSignedIn)?;
        drop(session);
        Ok(self.inner.cache.get(&owner, period).await?)
    }

    /// List all locally cached records, newest period first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotSignedIn`] without a session, or
    /// [`EngineError::Cache`] if the cache read fails.
    pub async fn history(&self) -> Result<Vec<AssessmentRecord>, EngineError> {
        let session = self.inner.session.lock().await;
        let owner = session.owner.clone().ok_or(EngineError::NotSignedIn)?;
        drop(session);
        Ok(self.inner.cache.list(&owner).await?)
    }

    /// Run a full reconciliation pass now (explicit user request or
    /// periodic tick). While offline the request is queued instead.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotSignedIn`] / [`EngineError::PasswordNotSet`]
    /// for an unusable session, or the pass failure (the engine moves to
    /// [`SyncState::SyncError`] and retries on the next trigger).
    pub async fn request_sync(&self) -> Result<(), EngineError> {
        {
            let mut session = self.inner.session.lock().await;
            if session.owner.is_none() {
                return Err(EngineError::NotSignedIn);
            }
            if session.key.is_none() {
                return Err(EngineError::PasswordNotSet);
            }
            if !session.online {
                session.follow_up = true;
                self.publish(
                    &mut session,
                    SyncState::Offline,
                    "Offline — changes saved locally",
                );
                return Ok(());
            }
        }
        self.run_pass(PassScope::Full).await
    }

    /// Report a connectivity change. Going offline keeps the session (and
    /// key) alive; coming back online resyncs automatically.
    ///
    /// # Errors
    ///
    /// Returns the resync pass failure, if one runs and fails.
    pub async fn set_connectivity(&self, online: bool) -> Result<(), EngineError> {
        let resync = {
            let mut session = self.inner.session.lock().await;
            session.online = online;
            if online {
                let ready = session.owner.is_some() && session.key.is_some();
                ready && (session.state == SyncState::Offline || session.follow_up)
            } else {
                if session.owner.is_some() {
                    self.publish(
                        &mut session,
                        SyncState::Offline,
                        "Offline — changes saved locally",
                    );
                }
                false
            }
        };
        if resync {
            info!("connectivity restored, resyncing");
            self.run_pass(PassScope::Full).await?;
        }
        Ok(())
    }

    /// Sign out. The encryption key is discarded from memory immediately
    /// and any in-flight pass is abandoned; local cached data stays.
    pub async fn sign_out(&self) {
        self.inner.identity.sign_out().await;
        let mut session = self.inner.session.lock().await;
        session.epoch = session.epoch.wrapping_add(1);
        session.owner = None;
        session.key = None; // zeroized on drop
        session.salt = None;
        session.dirty.clear();
        session.follow_up = false;
        self.publish(&mut session, SyncState::SignedOut, "Signed out");
        info!("signed out, encryption key discarded");
    }

    fn publish(&self, session: &mut Session, state: SyncState, message: &str) {
        if session.state != state {
            debug!(from = ?session.state, to = ?state, "sync state transition");
        }
        session.state = state;
        self.inner.status_tx.send_replace(SyncStatus {
            state,
            message: message.to_owned(),
        });
    }

    fn schedule_debounced_sync(&self) {
        let engine = self.clone();
        let debounce = self.inner.config.sync_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = engine.run_pass(PassScope::Dirty).await {
                warn!(error = %e, "debounced sync pass failed, will retry on next trigger");
            }
        });
    }

    /// Bound a remote call by the configured network timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.inner.config.network_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Remote(RemoteError::Network {
                reason: format!("no response within {:?}", self.inner.config.network_timeout),
            })),
        }
    }

    async fn epoch_current(&self, epoch: u64) -> bool {
        self.inner.session.lock().await.epoch == epoch
    }

    /// Run one serialized reconciliation pass (plus any coalesced
    /// follow-up). Concurrent triggers set the follow-up flag and return.
    async fn run_pass(&self, scope: PassScope) -> Result<(), EngineError> {
        let Ok(_gate) = self.inner.pass_gate.try_lock() else {
            self.inner.session.lock().await.follow_up = true;
            debug!("sync trigger coalesced into follow-up pass");
            return Ok(());
        };

        let mut scope = scope;
        loop {
            let (epoch, owner, key, salt, dirty) = {
                let mut session = self.inner.session.lock().await;
                let owner = session.owner.clone().ok_or(EngineError::NotSignedIn)?;
                let key = session.key.clone().ok_or(EngineError::PasswordNotSet)?;
                let salt = session.salt.ok_or(EngineError::PasswordNotSet)?;
                if !session.online {
                    session.follow_up = true;
                    self.publish(
                        &mut session,
                        SyncState::Offline,
                        "Offline — changes saved locally",
                    );
                    return Ok(());
                }
                self.publish(&mut session, SyncState::Syncing, "Syncing…");
                (session.epoch, owner, key, salt, session.dirty.clone())
            };

            let result = self.reconcile(scope, epoch, &owner, &key, &salt, &dirty).await;

            let mut session = self.inner.session.lock().await;
            if session.epoch != epoch {
                debug!("reconciliation pass abandoned after sign-out, result discarded");
                return Ok(());
            }
            match result {
                Ok(synced) => {
                    for period in &synced {
                        session.dirty.remove(period);
                    }
                    self.publish(&mut session, SyncState::Synced, "Synced");
                }
                Err(e) => {
                    warn!(error = %e, "reconciliation pass failed");
                    self.publish(&mut session, SyncState::SyncError, "Sync error — will retry");
                    return Err(e);
                }
            }
            if !session.follow_up {
                return Ok(());
            }
            session.follow_up = false;
            drop(session);
            // The follow-up stands in for every coalesced trigger, so it
            // covers the full period set.
            scope = PassScope::Full;
        }
    }

    /// Reconcile the periods in scope; returns those brought in sync.
    async fn reconcile(
        &self,
        scope: PassScope,
        epoch: u64,
        owner: &OwnerId,
        key: &EncryptionKey,
        salt: &Salt,
        dirty: &BTreeSet<Period>,
    ) -> Result<Vec<Period>, EngineError> {
        let mut periods = dirty.clone();
        if scope == PassScope::Full {
            for record in self.inner.cache.list(owner).await? {
                periods.insert(record.period);
            }
            for raw in self.bounded(self.inner.remote.list_periods(owner.as_str())).await? {
                match raw.parse::<Period>() {
                    Ok(period) => {
                        periods.insert(period);
                    }
                    Err(_) => {
                        warn!(period = %raw, "skipping remote document with unparseable period");
                    }
                }
            }
        }

        let mut synced = Vec::with_capacity(periods.len());
        for period in periods {
            if !self.epoch_current(epoch).await {
                break;
            }
            self.reconcile_period(owner, period, key, salt).await?;
            synced.push(period);
        }
        Ok(synced)
    }

    /// Reconcile one period between cache and remote.
    ///
    /// Local-only pushes, remote-only pulls, identical copies are left
    /// alone, and divergent copies resolve by last-writer-wins on the
    /// embedded save timestamp (revision breaks ties, local wins exact
    /// ties).
    async fn reconcile_period(
        &self,
        owner: &OwnerId,
        period: Period,
        key: &EncryptionKey,
        salt: &Salt,
    ) -> Result<(), EngineError> {
        let local = self.inner.cache.get(owner, period).await?;
        let blob = self
            .bounded(self.inner.remote.download(owner.as_str(), &period.to_string()))
            .await?;
        let remote = match blob {
            None => None,
            Some(bytes) => Some(crypto::open(&CipherEnvelope::from_bytes(&bytes)?, key)?),
        };

        match (local, remote) {
            (None, None) => Ok(()),
            (Some(local), None) => self.push(&local, key, salt).await,
            (None, Some(remote)) => {
                self.inner.cache.adopt(&remote).await?;
                debug!(%period, revision = remote.revision, "pulled remote record");
                Ok(())
            }
            (Some(local), Some(remote)) => {
                if local == remote {
                    return Ok(());
                }
                if (remote.saved_at, remote.revision) > (local.saved_at, local.revision) {
                    info!(%period, discarded = "local", "sync conflict resolved by last-writer-wins");
                    self.inner.cache.adopt(&remote).await?;
                } else {
                    info!(%period, discarded = "remote", "sync conflict resolved by last-writer-wins");
                    self.push(&local, key, salt).await?;
                }
                Ok(())
            }
        }
    }

    async fn push(
        &self,
        record: &AssessmentRecord,
        key: &EncryptionKey,
        salt: &Salt,
    ) -> Result<(), EngineError> {
        let envelope = crypto::seal(record, key, salt)?;
        self.bounded(self.inner.remote.upload(
            record.owner.as_str(),
            &record.period.to_string(),
            &envelope.to_bytes(),
        ))
        .await?;
        debug!(period = %record.period, revision = record.revision, "pushed record");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wellsync_store::{MemoryBackend, MemoryRemote};

    use super::*;
    use crate::identity::{RejectingIdentity, StaticIdentity};
    use crate::kdf::KdfParams;

    fn test_config() -> EngineConfig {
        EngineConfig {
            kdf: KdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            // Long enough that no debounced pass fires mid-test.
            sync_debounce: Duration::from_secs(60),
            network_timeout: Duration::from_secs(1),
        }
    }

    fn engine_with(remote: &MemoryRemote, owner: &str) -> SyncEngine {
        SyncEngine::new(
            LocalCache::new(Arc::new(MemoryBackend::new())),
            Arc::new(remote.clone()),
            Arc::new(StaticIdentity::new(owner)),
            test_config(),
        )
    }

    fn ratings(pairs: &[(&str, u8)]) -> BTreeMap<String, u8> {
        pairs.iter().map(|(q, r)| ((*q).to_owned(), *r)).collect()
    }

    async fn seed_remote(remote: &MemoryRemote, owner: &str, period: &str, password: &str) {
        let salt = kdf::generate_salt();
        let key = kdf::derive(password, &salt, &test_config().kdf).unwrap();
        let record = AssessmentRecord::new(
            OwnerId::new(owner),
            period.parse().unwrap(),
            ratings(&[("sleep_1", 3)]),
        );
        let envelope = crypto::seal(&record, &key, &salt).unwrap();
        remote
            .upload(owner, period, &envelope.to_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sign_in_demands_encryption_password() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        assert_eq!(engine.state().await, SyncState::PasswordRequired);
    }

    #[tokio::test]
    async fn rejected_sign_in_returns_to_signed_out() {
        let engine = SyncEngine::new(
            LocalCache::new(Arc::new(MemoryBackend::new())),
            Arc::new(MemoryRemote::new()),
            Arc::new(RejectingIdentity),
            test_config(),
        );
        let result = engine.sign_in().await;
        assert!(matches!(result, Err(EngineError::Identity(_))));
        assert_eq!(engine.state().await, SyncState::SignedOut);
    }

    #[tokio::test]
    async fn brand_new_account_syncs_immediately() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        // Nothing remote to verify against — a six-character password is
        // accepted outright and a fresh salt covers all future seals.
        engine.submit_password("abcdef").await.unwrap();
        assert_eq!(engine.state().await, SyncState::Synced);
    }

    #[tokio::test]
    async fn short_password_is_rejected_locally() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        let result = engine.submit_password("abc").await;
        assert!(matches!(result, Err(EngineError::Kdf(_))));
        assert_eq!(engine.state().await, SyncState::PasswordRequired);
    }

    #[tokio::test]
    async fn wrong_password_against_existing_remote_record() {
        let remote = MemoryRemote::new();
        seed_remote(&remote, "alice", "2024-03", "correct-horse").await;
        let uploads_before = remote.upload_count();

        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        let result = engine.submit_password("hunter2x").await;

        assert!(matches!(
            result,
            Err(EngineError::Crypto(CryptoError::AuthenticationFailure))
        ));
        assert_eq!(engine.state().await, SyncState::PasswordRequired);
        // No store was mutated.
        assert_eq!(remote.upload_count(), uploads_before);
        assert!(engine.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn correct_password_pulls_existing_remote_records() {
        let remote = MemoryRemote::new();
        seed_remote(&remote, "alice", "2024-03", "correct-horse").await;

        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("correct-horse").await.unwrap();

        assert_eq!(engine.state().await, SyncState::Synced);
        let record = engine
            .load("2024-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.ratings["sleep_1"], 3);
    }

    #[tokio::test]
    async fn save_requires_sign_in() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        let result = engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 4)]))
            .await;
        assert!(matches!(result, Err(EngineError::NotSignedIn)));
    }

    #[tokio::test]
    async fn save_works_before_password_and_while_offline() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();

        // No password yet — the local write still lands durably.
        let stored = engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 4)]))
            .await
            .unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(remote.upload_count(), 0);

        let loaded = engine
            .load("2024-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn request_sync_pushes_local_records() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("abcdef").await.unwrap();

        engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 4)]))
            .await
            .unwrap();
        engine.request_sync().await.unwrap();

        assert_eq!(engine.state().await, SyncState::Synced);
        assert!(remote.download("alice", "2024-03").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn offline_request_sync_queues_and_keeps_session() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("abcdef").await.unwrap();

        engine.set_connectivity(false).await.unwrap();
        assert_eq!(engine.state().await, SyncState::Offline);

        // Local writes keep working, the key stays valid.
        engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 2)]))
            .await
            .unwrap();
        engine.request_sync().await.unwrap();
        assert_eq!(engine.state().await, SyncState::Offline);
        assert_eq!(remote.upload_count(), 0);
    }

    #[tokio::test]
    async fn corrupted_remote_record_surfaces_sync_error_then_recovers() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("abcdef").await.unwrap();
        engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 4)]))
            .await
            .unwrap();
        engine.request_sync().await.unwrap();

        // Corrupt the remote blob behind the engine's back.
        let mut blob = remote.download("alice", "2024-03").await.unwrap().unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        remote.upload("alice", "2024-03", &blob).await.unwrap();

        let result = engine.request_sync().await;
        assert!(matches!(
            result,
            Err(EngineError::Crypto(CryptoError::AuthenticationFailure))
        ));
        assert_eq!(engine.state().await, SyncState::SyncError);
        // The local copy was left untouched.
        let local = engine
            .load("2024-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.ratings["sleep_1"], 4);

        // Once the blob is replaced with something that opens, the next
        // pass clears the error state.
        engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 5)]))
            .await
            .unwrap();
        seed_replacement(&remote, &engine).await;
        engine.request_sync().await.unwrap();
        assert_eq!(engine.state().await, SyncState::Synced);
    }

    /// Replace the corrupted blob with a freshly sealed copy of the local
    /// record so the recovery pass can run clean.
    async fn seed_replacement(remote: &MemoryRemote, engine: &SyncEngine) {
        let session = engine.inner.session.lock().await;
        let key = session.key.clone().unwrap();
        let salt = session.salt.unwrap();
        drop(session);
        let record = engine
            .load("2024-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        let envelope = crypto::seal(&record, &key, &salt).unwrap();
        remote
            .upload("alice", "2024-03", &envelope.to_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn network_failure_during_sync_sets_sync_error() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("abcdef").await.unwrap();
        engine
            .save("2024-03".parse().unwrap(), ratings(&[("sleep_1", 4)]))
            .await
            .unwrap();

        // Transport drops without the engine being told it is offline.
        remote.set_online(false);
        let result = engine.request_sync().await;
        assert!(matches!(
            result,
            Err(EngineError::Remote(RemoteError::Network { .. }))
        ));
        assert_eq!(engine.state().await, SyncState::SyncError);

        // Next trigger after transport recovery clears the error.
        remote.set_online(true);
        engine.request_sync().await.unwrap();
        assert_eq!(engine.state().await, SyncState::Synced);
    }

    #[tokio::test]
    async fn sign_out_discards_key_and_state() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.submit_password("abcdef").await.unwrap();

        engine.sign_out().await;
        assert_eq!(engine.state().await, SyncState::SignedOut);
        assert!(matches!(
            engine.request_sync().await,
            Err(EngineError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn status_stream_reports_transitions() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        let rx = engine.subscribe();
        assert_eq!(rx.borrow().message, "Signed out");

        engine.sign_in().await.unwrap();
        assert_eq!(rx.borrow().message, "Encryption password required");

        engine.submit_password("abcdef").await.unwrap();
        assert_eq!(rx.borrow().state, SyncState::Synced);

        engine.set_connectivity(false).await.unwrap();
        assert_eq!(rx.borrow().message, "Offline — changes saved locally");
    }

    #[tokio::test]
    async fn cancel_password_disables_sync_but_keeps_session() {
        let remote = MemoryRemote::new();
        let engine = engine_with(&remote, "alice");
        engine.sign_in().await.unwrap();
        engine.cancel_password().await;
        assert_eq!(engine.state().await, SyncState::PasswordRequired);
        assert!(matches!(
            engine.request_sync().await,
            Err(EngineError::PasswordNotSet)
        ));
    }
}

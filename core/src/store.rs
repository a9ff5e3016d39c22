use crate::{Context, Error, ProvideCredential, Result, SigningCredential};
use log::debug;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// CredentialStore holds the current credential snapshot and refreshes it on demand.
///
/// - [`CredentialStore::current`] never waits on a refresh.
/// - [`CredentialStore::refresh`] runs the provider inside a critical section. Callers
///   that queue up behind an in-flight refresh reuse its result instead of calling the
///   provider again.
///
/// Each successful swap bumps the epoch. A provider failure leaves both the snapshot
/// and the epoch untouched.
pub struct CredentialStore<K: SigningCredential> {
    provider: Arc<dyn ProvideCredential<Credential = K>>,
    snapshot: Mutex<Option<K>>,
    epoch: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<K: SigningCredential> Debug for CredentialStore<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("provider", &self.provider)
            .field("snapshot", &*self.lock_snapshot())
            .field("epoch", &self.epoch())
            .finish()
    }
}

impl<K: SigningCredential> CredentialStore<K> {
    /// Create a store without an initial snapshot.
    pub fn new(provider: impl ProvideCredential<Credential = K>) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// Create a store from a shared provider.
    pub fn from_arc(provider: Arc<dyn ProvideCredential<Credential = K>>) -> Self {
        Self {
            provider,
            snapshot: Mutex::new(None),
            epoch: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Seed the store with initial credentials.
    pub fn with_credential(self, cred: K) -> Self {
        self.set(cred);
        self
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Option<K>> {
        // The guarded value is replaced as a whole, a poisoned lock still holds a full snapshot.
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the snapshot and start a new epoch.
    pub fn set(&self, cred: K) {
        let mut snapshot = self.lock_snapshot();
        *snapshot = Some(cred);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Current epoch, bumped on every swap.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// The latest snapshot.
    pub fn current(&self) -> Option<K> {
        self.lock_snapshot().clone()
    }

    /// The latest snapshot together with the epoch it belongs to.
    pub fn current_with_epoch(&self) -> (Option<K>, u64) {
        let snapshot = self.lock_snapshot();
        (snapshot.clone(), self.epoch())
    }

    /// Refresh the credential through the provider.
    pub async fn refresh(&self, ctx: &Context) -> Result<K> {
        let seen = self.epoch();
        self.refresh_since(ctx, seen).await
    }

    /// Refresh the credential unless the store moved past `seen` already.
    ///
    /// Pass the epoch of the snapshot that got rejected. If another caller swapped
    /// in a newer credential meanwhile, that one is returned and the provider is
    /// not called.
    pub async fn refresh_since(&self, ctx: &Context, seen: u64) -> Result<K> {
        let _guard = self.refresh_lock.lock().await;

        let (current, epoch) = self.current_with_epoch();
        if epoch != seen {
            if let Some(cred) = current {
                debug!("credential refreshed by another caller at epoch {epoch}, reuse it");
                return Ok(cred);
            }
        }

        debug!("refreshing credential at epoch {epoch}");
        let cred = self
            .provider
            .provide_credential(ctx)
            .await?
            .ok_or_else(|| {
                Error::credential_invalid("credential provider returned no credential")
            })?;

        self.set(cred.clone());
        debug!("credential refreshed, now at epoch {}", self.epoch());
        Ok(cred)
    }
}

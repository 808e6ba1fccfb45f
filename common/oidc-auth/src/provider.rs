use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AuthorizationSettings;
use crate::error::KeyFetchError;
use crate::jwks::{SigningKeySet, SigningKeySource};

/// Cached access to the issuer's signing keys.
#[async_trait]
pub trait SigningKeyProvider: Send + Sync {
    /// Returns the cached keys while fresh, otherwise fetches and caches a new set.
    async fn signing_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError>;

    /// Marks the cache stale so that a later [`SigningKeyProvider::signing_keys`]
    /// call fetches again. Never fetches and never blocks.
    fn request_refresh(&self);

    /// Fetches immediately, ignoring freshness and the minimum refresh interval.
    async fn force_refresh(&self) -> Result<Arc<SigningKeySet>, KeyFetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub min_refresh_interval: Duration,
    pub automatic_refresh_interval: Duration,
}

impl From<&AuthorizationSettings> for RefreshPolicy {
    fn from(settings: &AuthorizationSettings) -> Self {
        Self {
            min_refresh_interval: settings.min_refresh_interval,
            automatic_refresh_interval: settings.automatic_refresh_interval,
        }
    }
}

/// [`SigningKeyProvider`] backed by an atomically swapped snapshot.
///
/// Reads load the current `Arc<SigningKeySet>` without locking. Fetches are
/// serialized by `fetch_lock`, and callers queued behind an in-flight fetch
/// re-check freshness once they get the lock, so a stale window produces a
/// single network round trip.
///
/// `min_refresh_interval` also bounds retries after a failed fetch: until it
/// has passed since that attempt, callers get the previous snapshot, or the
/// last error while the cache is cold. Only `force_refresh` skips the wait.
pub struct CachingKeyProvider<S> {
    source: S,
    policy: RefreshPolicy,
    cached: ArcSwapOption<SigningKeySet>,
    stale: AtomicBool,
    fetch_lock: Mutex<FetchState>,
}

#[derive(Default)]
struct FetchState {
    last_attempt: Option<Instant>,
    last_error: Option<KeyFetchError>,
}

impl<S: SigningKeySource> CachingKeyProvider<S> {
    pub fn new(source: S, policy: RefreshPolicy) -> Self {
        Self {
            source,
            policy,
            cached: ArcSwapOption::empty(),
            stale: AtomicBool::new(false),
            fetch_lock: Mutex::new(FetchState::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current snapshot, regardless of freshness.
    pub fn cached(&self) -> Option<Arc<SigningKeySet>> {
        self.cached.load_full()
    }

    pub fn is_refresh_requested(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn fresh_snapshot(&self) -> Option<Arc<SigningKeySet>> {
        let current = self.cached.load_full()?;
        let age = current.age();
        if age >= self.policy.automatic_refresh_interval {
            return None;
        }
        if self.stale.load(Ordering::Acquire) && age >= self.policy.min_refresh_interval {
            return None;
        }
        Some(current)
    }

    async fn fetch_and_swap(
        &self,
        state: &mut FetchState,
    ) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        // Requests arriving while the fetch runs stay recorded for the next window.
        let was_stale = self.stale.swap(false, Ordering::AcqRel);
        state.last_attempt = Some(Instant::now());

        match self.source.fetch_signing_keys().await {
            Ok(set) => {
                let set = Arc::new(set);
                self.cached.store(Some(Arc::clone(&set)));
                state.last_error = None;
                info!(keys = set.len(), "refreshed issuer signing keys");
                Ok(set)
            }
            Err(err) => {
                if was_stale {
                    self.stale.store(true, Ordering::Release);
                }
                warn!(error = %err, "failed to fetch issuer signing keys");
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<S: SigningKeySource> SigningKeyProvider for CachingKeyProvider<S> {
    async fn signing_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }

        let mut state = self.fetch_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }

        let previous = self.cached.load_full();
        let recent_failure = state
            .last_error
            .as_ref()
            .filter(|_| {
                state
                    .last_attempt
                    .is_some_and(|at| at.elapsed() < self.policy.min_refresh_interval)
            });
        if let Some(err) = recent_failure {
            return match &previous {
                Some(current) => Ok(Arc::clone(current)),
                None => Err(err.clone()),
            };
        }

        match self.fetch_and_swap(&mut state).await {
            Ok(set) => Ok(set),
            Err(err) => match previous {
                Some(current) => {
                    warn!(error = %err, "serving previously fetched signing keys");
                    Ok(current)
                }
                None => Err(err),
            },
        }
    }

    fn request_refresh(&self) {
        if !self.stale.swap(true, Ordering::AcqRel) {
            debug!("signing key refresh requested");
        }
    }

    async fn force_refresh(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        let mut state = self.fetch_lock.lock().await;
        self.fetch_and_swap(&mut state).await
    }
}

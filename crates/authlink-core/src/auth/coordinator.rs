//! Single-flight coordination of token renewal.
//!
//! Any number of requests may discover at the same moment that the access
//! token has expired. The first one to ask starts a renewal episode; every
//! other caller that asks before the episode settles awaits the very same
//! outcome. The in-flight slot is emptied before the outcome is delivered,
//! so a renewal need that arises after settlement always starts a fresh
//! episode instead of observing a stale one.
//!
//! Login and logout start a new session generation through
//! [`RenewalCoordinator::reset`]. An episode that settles in a later
//! generation than the one it started in leaves the holder and the
//! observer alone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::{AccessToken, RenewalError, Renewer, TokenStore};

type RenewalFuture = Shared<BoxFuture<'static, Result<AccessToken, RenewalError>>>;

/// Hook notified once per settled renewal episode.
///
/// Called from inside the episode with the in-flight slot locked, before
/// any waiting request resumes. Implementations must not call back into
/// the coordinator.
pub trait RenewalObserver: Send + Sync {
    fn renewed(&self, token: &AccessToken);
    fn expired(&self, error: &RenewalError);
}

struct InFlight {
    episode: u64,
    renewal: RenewalFuture,
}

struct Inner {
    tokens: TokenStore,
    renewer: Arc<dyn Renewer>,
    in_flight: Mutex<Option<InFlight>>,
    observer: RwLock<Option<Arc<dyn RenewalObserver>>>,
    episodes: AtomicU64,
    /// Only written with `in_flight` locked.
    generation: AtomicU64,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> Option<Arc<dyn RenewalObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Clone)]
pub struct RenewalCoordinator {
    inner: Arc<Inner>,
}

impl RenewalCoordinator {
    pub fn new(tokens: TokenStore, renewer: Arc<dyn Renewer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                renewer,
                in_flight: Mutex::new(None),
                observer: RwLock::new(None),
                episodes: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Install the hook notified when an episode settles. Replaces any previous hook.
    pub fn set_observer(&self, observer: Arc<dyn RenewalObserver>) {
        *self
            .inner
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Number of renewal episodes started so far.
    pub fn episodes(&self) -> u64 {
        self.inner.episodes.load(Ordering::SeqCst)
    }

    /// Current session generation, bumped by every [`reset`](Self::reset).
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn is_renewing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Start a new session generation with `token` in the holder.
    ///
    /// A renewal still in flight is detached: it settles without touching
    /// the holder or the observer and its waiters get
    /// [`RenewalError::Superseded`]. The next renewal need starts a fresh
    /// episode. Returns the new generation.
    pub fn reset(&self, token: Option<AccessToken>) -> u64 {
        let mut slot = self.inner.slot();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if slot.take().is_some() {
            debug!(generation, "Detached in-flight token renewal");
        }
        self.inner.tokens.set(token);
        generation
    }

    /// Obtain a token to retry with after a request sent with `sent_with` was rejected.
    ///
    /// Joins the in-flight episode if there is one. Otherwise, if the holder
    /// already carries a different token than the rejected request did, that
    /// token is returned as is; only when the rejected token is still current
    /// does a new episode start.
    pub async fn acquire(
        &self,
        sent_with: Option<&AccessToken>,
    ) -> Result<AccessToken, RenewalError> {
        let renewal = {
            let mut slot = self.inner.slot();

            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(episode = in_flight.episode, "Joining in-flight token renewal");
                    in_flight.renewal.clone()
                }
                None => {
                    if let Some(current) = self.inner.tokens.get() {
                        if sent_with != Some(&current) {
                            debug!("Token changed since the request was sent, reusing it");
                            return Ok(current);
                        }
                    }
                    let episode = self.inner.episodes.fetch_add(1, Ordering::SeqCst) + 1;
                    let generation = self.inner.generation.load(Ordering::SeqCst);
                    let renewal =
                        Self::episode(Arc::clone(&self.inner), episode, generation).shared();
                    *slot = Some(InFlight {
                        episode,
                        renewal: renewal.clone(),
                    });
                    renewal
                }
            }
        };

        renewal.await
    }

    fn episode(
        inner: Arc<Inner>,
        episode: u64,
        generation: u64,
    ) -> BoxFuture<'static, Result<AccessToken, RenewalError>> {
        async move {
            info!(episode, "Access token rejected, renewing");

            let outcome = inner.renewer.renew().await;

            // Holder, slot and observer change together so an `acquire`
            // never sees an empty slot next to the rejected token.
            let mut slot = inner.slot();

            if inner.generation.load(Ordering::SeqCst) != generation {
                debug!(episode, "Session reset during renewal, discarding outcome");
                return Err(RenewalError::Superseded);
            }

            let observer = inner.observer();
            match &outcome {
                Ok(token) => {
                    inner.tokens.set(Some(token.clone()));
                    info!(episode, "Access token renewed");
                    if let Some(observer) = observer {
                        observer.renewed(token);
                    }
                }
                Err(e) => {
                    inner.tokens.clear();
                    warn!(episode, error = %e, "Token renewal failed, session ended");
                    if let Some(observer) = observer {
                        observer.expired(e);
                    }
                }
            }

            if slot.as_ref().map(|f| f.episode) == Some(episode) {
                slot.take();
            }

            outcome
        }
        .boxed()
    }
}

impl fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("episodes", &self.episodes())
            .field("renewing", &self.is_renewing())
            .finish()
    }
}

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use hashbrown::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    remote::{TransportError, TransportResult},
    types::Resource,
};

use super::snapshot::{CacheItem, CacheSnapshot, UndoToken};

/// A read could not reach the server. The last good snapshot is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    /// Resource that was being fetched.
    pub resource: Resource,
    /// Transport failure behind it.
    pub source: TransportError,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to fetch {}: {}", self.resource, self.source)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Result of a cache read that may have gone to the server.
pub type FetchOutcome<T> = Result<CacheSnapshot<T>, FetchError>;

/// Loads the full server-side list of a resource.
#[async_trait]
pub trait Fetch<T>: Send + Sync {
    /// Every entity of the resource, in server order.
    async fn fetch(&self) -> TransportResult<Vec<T>>;
}

struct InFlightFetch<T> {
    id: u64,
    epoch: u64,
    generation: u64,
    tx: broadcast::Sender<FetchOutcome<T>>,
}

struct CacheState<T> {
    snapshot: Option<CacheSnapshot<T>>,
    fetch: Option<InFlightFetch<T>>,
    next_fetch_id: u64,
    next_version: u64,
    // Bumped by every optimistic apply and rollback. A fetch started under an
    // older epoch must not overwrite the cache.
    epoch: u64,
    // Bumped by every commit and by every invalidation that marks the
    // snapshot stale. Fetches of an older generation are superseded: they are
    // neither joined nor installed.
    generation: u64,
    in_flight: usize,
    deferred_invalidation: bool,
}

impl<T> CacheState<T> {
    fn take_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn is_current(&self, epoch: u64, generation: u64) -> bool {
        self.epoch == epoch && self.generation == generation
    }
}

struct Inner<T> {
    resource: Resource,
    source: Arc<dyn Fetch<T>>,
    state: Mutex<CacheState<T>>,
}

/// In-memory mirror of one remote resource.
///
/// Reads through [`ResourceCache::view`] never wait. [`ResourceCache::get`]
/// refetches when the snapshot is missing or stale, sharing one in-flight
/// request between callers. The fetch runs on its own task, so a caller that
/// stops awaiting does not cancel it.
pub struct ResourceCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CacheItem> ResourceCache<T> {
    /// Empty cache for `resource`, loaded through `source`.
    pub fn new(resource: Resource, source: Arc<dyn Fetch<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource,
                source,
                state: Mutex::new(CacheState {
                    snapshot: None,
                    fetch: None,
                    next_fetch_id: 0,
                    next_version: 0,
                    epoch: 0,
                    generation: 0,
                    in_flight: 0,
                    deferred_invalidation: false,
                }),
            }),
        }
    }

    /// Resource this cache mirrors.
    pub fn resource(&self) -> Resource {
        self.inner.resource
    }

    /// Current snapshot, tentative changes included. Never suspends.
    pub fn view(&self) -> Option<CacheSnapshot<T>> {
        self.inner.lock().snapshot.clone()
    }

    /// Number of optimistic mutations that have not settled.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// True when an invalidation arrived during an optimistic mutation and
    /// is waiting for it to settle.
    pub fn has_deferred_invalidation(&self) -> bool {
        self.inner.lock().deferred_invalidation
    }

    /// Returns the snapshot, fetching first if it is missing or stale.
    pub async fn get(&self) -> FetchOutcome<T> {
        let rx = {
            let mut state = self.inner.lock();
            if let Some(snapshot) = state.snapshot.as_ref().filter(|s| !s.stale) {
                return Ok(snapshot.clone());
            }
            self.inner.start_fetch(&mut state)
        };
        self.inner.await_fetch(rx).await
    }

    /// Marks the snapshot stale without clearing it.
    ///
    /// A fetch already running is superseded, so the next
    /// [`ResourceCache::get`] reads the server again. While an optimistic
    /// mutation is in flight the invalidation is only recorded; the
    /// mutation's [`ResourceCache::commit`] refetch honours it.
    pub fn invalidate(&self) {
        let mut state = self.inner.lock();
        if state.in_flight > 0 {
            debug!(
                resource = %self.inner.resource,
                in_flight = state.in_flight,
                "deferring invalidation until mutations settle"
            );
            state.deferred_invalidation = true;
            return;
        }
        state.generation += 1;
        if let Some(snapshot) = state.snapshot.as_mut() {
            snapshot.stale = true;
        }
    }

    /// Applies `mutator` to the cached entities right away.
    ///
    /// The returned token captures the pre-mutation snapshot. A cache that has
    /// never been fetched is left empty, but the mutation still counts as in
    /// flight.
    pub fn apply_optimistic(&self, mutator: impl FnOnce(Vec<T>) -> Vec<T>) -> UndoToken<T> {
        let mut state = self.inner.lock();
        let previous = state.snapshot.clone();
        let mut removed = Vec::new();
        let mut added = Vec::new();

        if let Some(prev) = previous.as_ref() {
            let version = state.take_version();
            let items = mutator(prev.items.clone());
            (removed, added) = diff_keys(prev.items(), &items);
            state.snapshot = Some(CacheSnapshot {
                items,
                stale: prev.stale,
                version,
            });
        }

        state.epoch += 1;
        state.in_flight += 1;

        UndoToken {
            previous,
            removed,
            added,
            epoch: state.epoch,
            rolled_back: false,
        }
    }

    /// Restores the snapshot captured by `token`.
    ///
    /// If another optimistic mutation changed the cache after `token` was
    /// taken, only this mutation's own change is reverted: entities it removed
    /// go back at their captured positions and entities it added are dropped.
    pub fn rollback(&self, token: &mut UndoToken<T>) {
        if token.rolled_back {
            return;
        }
        token.rolled_back = true;

        let Some(previous) = token.previous.as_ref() else {
            return;
        };

        let mut state = self.inner.lock();
        let version = state.take_version();

        let (items, stale) = match state.snapshot.take() {
            Some(current) if state.epoch != token.epoch => {
                (reconcile(current.items, &token.removed, &token.added), current.stale)
            }
            _ => (previous.items.clone(), previous.stale),
        };

        debug!(resource = %self.inner.resource, "rolled back optimistic mutation");
        state.snapshot = Some(CacheSnapshot { items, stale, version });
        state.epoch += 1;
    }

    /// Settles the mutation behind `token` and refetches canonical state.
    ///
    /// Runs whether the remote call succeeded or failed. Any fetch already
    /// running may predate the remote call and is superseded. When other
    /// optimistic mutations are still in flight the snapshot is only marked
    /// stale and the last one to settle performs the refetch.
    pub async fn commit(&self, token: UndoToken<T>) -> Result<(), FetchError> {
        let rx = {
            let mut state = self.inner.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.generation += 1;
            if let Some(snapshot) = state.snapshot.as_mut() {
                snapshot.stale = true;
            }
            if state.in_flight > 0 {
                debug!(resource = %self.inner.resource, "refetch left to a later settle");
                return Ok(());
            }
            if state.deferred_invalidation {
                debug!(resource = %self.inner.resource, "applying deferred invalidation");
                state.deferred_invalidation = false;
            }
            self.inner.start_fetch(&mut state)
        };
        drop(token);
        self.inner.await_fetch(rx).await.map(|_| ())
    }
}

impl<T: CacheItem> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Joins the running fetch if it is still current, otherwise spawns a new
    // one.
    fn start_fetch(
        self: &Arc<Self>,
        state: &mut CacheState<T>,
    ) -> broadcast::Receiver<FetchOutcome<T>> {
        if let Some(running) = state
            .fetch
            .as_ref()
            .filter(|f| state.is_current(f.epoch, f.generation))
        {
            return running.tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(1);
        state.next_fetch_id += 1;
        let id = state.next_fetch_id;
        let (epoch, generation) = (state.epoch, state.generation);
        state.fetch = Some(InFlightFetch {
            id,
            epoch,
            generation,
            tx: tx.clone(),
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_fetch(id, epoch, generation, tx).await;
        });
        rx
    }

    async fn run_fetch(
        &self,
        id: u64,
        epoch: u64,
        generation: u64,
        tx: broadcast::Sender<FetchOutcome<T>>,
    ) {
        debug!(resource = %self.resource, fetch = id, "fetch started");
        let result = self.source.fetch().await;

        let outcome = {
            let mut state = self.lock();
            if state.fetch.as_ref().is_some_and(|f| f.id == id) {
                state.fetch = None;
            }

            match result {
                Ok(items) if state.is_current(epoch, generation) && state.in_flight == 0 => {
                    let items = dedupe(self.resource, items);
                    let version = state.take_version();
                    let snapshot = CacheSnapshot::fresh(items, version);
                    state.snapshot = Some(snapshot.clone());
                    debug!(
                        resource = %self.resource,
                        fetch = id,
                        len = snapshot.len(),
                        "fetch installed"
                    );
                    Ok(snapshot)
                }
                Ok(items) => {
                    debug!(
                        resource = %self.resource,
                        fetch = id,
                        "fetch superseded by a mutation or invalidation, not installed"
                    );
                    match state.snapshot.clone() {
                        Some(current) => Ok(current),
                        None => Ok(CacheSnapshot::fresh(dedupe(self.resource, items), 0)),
                    }
                }
                Err(source) => {
                    warn!(
                        resource = %self.resource,
                        fetch = id,
                        error = %source,
                        "fetch failed, keeping last snapshot"
                    );
                    Err(FetchError {
                        resource: self.resource,
                        source,
                    })
                }
            }
        };

        let _ = tx.send(outcome);
    }

    async fn await_fetch(&self, mut rx: broadcast::Receiver<FetchOutcome<T>>) -> FetchOutcome<T> {
        rx.recv().await.map_err(|_| FetchError {
            resource: self.resource,
            source: TransportError::Network("fetch task ended without a result".to_string()),
        })?
    }
}

fn dedupe<T: CacheItem>(resource: Resource, items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    let before = items.len();
    let out: Vec<T> = items
        .into_iter()
        .filter(|item| match item.key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect();
    if out.len() != before {
        warn!(%resource, dropped = before - out.len(), "server returned duplicate ids");
    }
    out
}

// Identities dropped by a transform (with their old positions) and identities
// it introduced.
fn diff_keys<T: CacheItem>(before: &[T], after: &[T]) -> (Vec<(usize, T)>, Vec<T::Key>) {
    let before_keys: HashSet<T::Key> = before.iter().filter_map(|item| item.key()).collect();
    let after_keys: HashSet<T::Key> = after.iter().filter_map(|item| item.key()).collect();

    let removed = before
        .iter()
        .enumerate()
        .filter(|(_, item)| item.key().is_some_and(|k| !after_keys.contains(&k)))
        .map(|(idx, item)| (idx, item.clone()))
        .collect();
    let added = after_keys
        .into_iter()
        .filter(|k| !before_keys.contains(k))
        .collect();
    (removed, added)
}

fn reconcile<T: CacheItem>(
    mut current: Vec<T>,
    removed: &[(usize, T)],
    added: &[T::Key],
) -> Vec<T> {
    current.retain(|item| item.key().is_none_or(|k| !added.contains(&k)));
    let mut present: HashSet<T::Key> = current.iter().filter_map(|item| item.key()).collect();
    for (idx, item) in removed {
        let Some(key) = item.key() else {
            continue;
        };
        if present.insert(key) {
            let at = (*idx).min(current.len());
            current.insert(at, item.clone());
        }
    }
    current
}

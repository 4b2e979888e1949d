//! Cached, deduplicating, cancellable execution of derived queries.
//!
//! One [`QueryExecutor`] exists per query variant. It guarantees that, at any
//! moment, at most one network request is in flight per distinct descriptor:
//! concurrent callers for the same canonical key share the single in-flight
//! fetch, and a successful result is retained for a long freshness window
//! (the backing dataset changes on curation timescales, so results are not
//! refetched on remount or refocus). Failures are surfaced once, never
//! cached and never retried; the only retry path is the user changing a
//! filter again.
//!
//! [`QuerySlot`] sits on top for view code: it tracks the latest descriptor
//! of interest, cancels superseded requests, and only ever applies the
//! outcome of the newest descriptor (last-descriptor-wins, not
//! last-response-wins).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ahash::AHashMap as HashMap;
use futures::{FutureExt, future::{BoxFuture, Shared}};
use serde::de::DeserializeOwned;
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    api::{ApiError, SearchTransport},
    config::DEFAULT_CACHE_TTL,
    query::QueryDescriptor,
};

type SharedFetch<R> = Shared<BoxFuture<'static, Result<Arc<R>, ApiError>>>;

struct CacheEntry<R> {
    value: Arc<R>,
    fetched_at: Instant,
}

struct InFlight<R> {
    fetch: SharedFetch<R>,
    cancel: CancellationToken,
    waiters: usize,
}

struct Inner<R> {
    transport: Arc<dyn SearchTransport>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry<R>>>,
    in_flight: Mutex<HashMap<String, InFlight<R>>>,
}

/// Request cache and dedup layer for one query variant.
///
/// Cheap to clone; clones share the same cache.
pub struct QueryExecutor<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for QueryExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> QueryExecutor<R>
where
    R: DeserializeOwned + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(transport: Arc<dyn SearchTransport>) -> Self {
        Self::with_ttl(transport, DEFAULT_CACHE_TTL)
    }

    #[must_use]
    pub fn with_ttl(transport: Arc<dyn SearchTransport>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                ttl,
                cache: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve a descriptor to its result.
    ///
    /// Returns a fresh cached result immediately when one exists; otherwise
    /// joins the in-flight request for an equivalent descriptor or issues a
    /// new one. `cancel` belongs to the caller: when it fires, this call
    /// returns [`ApiError::Cancelled`], and once no caller remains
    /// interested the underlying request itself is cancelled and discarded.
    #[instrument(level = "debug", skip_all, fields(endpoint = ?descriptor.endpoint))]
    pub async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Arc<R>, ApiError> {
        let key = descriptor.cache_key();
        if let Some(hit) = self.lookup(&key) {
            debug!("serving cached result");
            return Ok(hit);
        }

        let fetch = self.join_or_start(&key, descriptor);
        let result = tokio::select! {
            () = cancel.cancelled() => Err(ApiError::Cancelled),
            result = fetch => result,
        };
        self.depart(&key);
        result
    }

    /// A fresh cached result for this descriptor, if one exists.
    #[must_use]
    pub fn cached(&self, descriptor: &QueryDescriptor) -> Option<Arc<R>> {
        self.lookup(&descriptor.cache_key())
    }

    /// Drop the cached result for one descriptor.
    pub fn invalidate(&self, descriptor: &QueryDescriptor) {
        self.lock_cache().remove(&descriptor.cache_key());
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.lock_cache().clear();
    }

    fn lookup(&self, key: &str) -> Option<Arc<R>> {
        let mut cache = self.lock_cache();
        if let Some(entry) = cache.get(key) {
            if entry.fetched_at.elapsed() < self.inner.ttl {
                return Some(Arc::clone(&entry.value));
            }
            cache.remove(key);
        }
        None
    }

    /// Join the in-flight fetch for `key`, or start one. The fetch itself
    /// publishes to the cache and unregisters on completion; abandoned
    /// fetches are unregistered by the last departing waiter instead.
    fn join_or_start(&self, key: &str, descriptor: &QueryDescriptor) -> SharedFetch<R> {
        let mut in_flight = self.lock_in_flight();
        if let Some(entry) = in_flight.get_mut(key) {
            entry.waiters += 1;
            debug!("joining in-flight request");
            return entry.fetch.clone();
        }

        let cancel = CancellationToken::new();
        let fetch = start_fetch(
            Arc::clone(&self.inner),
            key.to_owned(),
            descriptor.clone(),
            cancel.clone(),
        );
        in_flight.insert(
            key.to_owned(),
            InFlight {
                fetch: fetch.clone(),
                cancel,
                waiters: 1,
            },
        );
        fetch
    }

    fn depart(&self, key: &str) {
        let mut in_flight = self.lock_in_flight();
        if let Some(entry) = in_flight.get_mut(key) {
            entry.waiters -= 1;
            if entry.waiters == 0 {
                entry.cancel.cancel();
                in_flight.remove(key);
                debug!("last waiter gone, dropped in-flight request");
            }
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<R>>> {
        self.inner.cache.lock().expect("executor cache lock poisoned")
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight<R>>> {
        self.inner
            .in_flight
            .lock()
            .expect("executor in-flight lock poisoned")
    }
}

fn start_fetch<R>(
    inner: Arc<Inner<R>>,
    key: String,
    descriptor: QueryDescriptor,
    cancel: CancellationToken,
) -> SharedFetch<R>
where
    R: DeserializeOwned + Send + Sync + 'static,
{
    async move {
        let result = inner
            .transport
            .post_json(descriptor.path(), &descriptor.body(), &cancel)
            .await
            .and_then(|value| serde_json::from_value::<R>(value).map_err(ApiError::from))
            .map(Arc::new);

        // Publish before unregistering, so a racing caller either joins this
        // entry or finds the cached value.
        if let Ok(value) = &result {
            inner
                .cache
                .lock()
                .expect("executor cache lock poisoned")
                .insert(
                    key.clone(),
                    CacheEntry {
                        value: Arc::clone(value),
                        fetched_at: Instant::now(),
                    },
                );
        }
        inner
            .in_flight
            .lock()
            .expect("executor in-flight lock poisoned")
            .remove(&key);
        result
    }
    .boxed()
    .shared()
}

/// What a view bound to a [`QuerySlot`] should currently render.
#[derive(Debug)]
pub enum SlotState<R> {
    /// No descriptor has been set yet.
    Idle,
    /// A request is in flight. `placeholder` carries the slot's previous
    /// result so pagination and filter refinements do not blank the view.
    Loading { placeholder: Option<Arc<R>> },
    Ready(Arc<R>),
    /// The request failed. No stale data is shown alongside an error.
    Failed(ApiError),
}

impl<R> Clone for SlotState<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Loading { placeholder } => Self::Loading {
                placeholder: placeholder.clone(),
            },
            Self::Ready(value) => Self::Ready(Arc::clone(value)),
            Self::Failed(error) => Self::Failed(error.clone()),
        }
    }
}

impl<R> SlotState<R> {
    /// The data a view should display: the ready result, or the
    /// stale-while-revalidate placeholder during a reload.
    #[must_use]
    pub fn data(&self) -> Option<&Arc<R>> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Loading {
                placeholder: Some(value),
            } => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

struct SlotInner<R> {
    generation: u64,
    cancel: Option<CancellationToken>,
    last_good: Option<Arc<R>>,
    state: SlotState<R>,
}

/// One view's handle onto an executor.
///
/// A slot remembers the latest descriptor it was given. Setting a new
/// descriptor cancels the previous request and bumps an internal generation;
/// a completion only lands if its generation is still current, so a late
/// response for a superseded descriptor can never overwrite a newer one.
pub struct QuerySlot<R> {
    executor: QueryExecutor<R>,
    inner: Arc<Mutex<SlotInner<R>>>,
    changed_tx: watch::Sender<u64>,
}

impl<R> QuerySlot<R>
where
    R: DeserializeOwned + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(executor: QueryExecutor<R>) -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            executor,
            inner: Arc::new(Mutex::new(SlotInner {
                generation: 0,
                cancel: None,
                last_good: None,
                state: SlotState::Idle,
            })),
            changed_tx,
        }
    }

    /// The current render state.
    #[must_use]
    pub fn state(&self) -> SlotState<R> {
        self.lock().state.clone()
    }

    /// A receiver that observes every state publication.
    #[must_use]
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }

    /// Point the slot at a new descriptor.
    ///
    /// Must be called from within a tokio runtime. A fresh cache hit is
    /// served synchronously; otherwise the slot enters
    /// [`SlotState::Loading`] with the previous result as placeholder and
    /// resolves in the background.
    pub fn set_descriptor(&self, descriptor: QueryDescriptor) {
        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            if let Some(previous) = inner.cancel.take() {
                previous.cancel();
            }

            if let Some(hit) = self.executor.cached(&descriptor) {
                inner.last_good = Some(Arc::clone(&hit));
                inner.state = SlotState::Ready(hit);
                let generation = inner.generation;
                drop(inner);
                let _ = self.changed_tx.send(generation);
                return;
            }

            inner.state = SlotState::Loading {
                placeholder: inner.last_good.clone(),
            };
            inner.cancel = Some(cancel.clone());
            inner.generation
        };
        let _ = self.changed_tx.send(generation);

        let executor = self.executor.clone();
        let slot = Arc::clone(&self.inner);
        let changed_tx = self.changed_tx.clone();
        tokio::spawn(async move {
            let result = executor.execute(&descriptor, &cancel).await;

            let mut inner = slot.lock().expect("query slot lock poisoned");
            if inner.generation != generation {
                // A newer descriptor took over; this outcome is discarded.
                return;
            }
            match result {
                Ok(value) => {
                    inner.last_good = Some(Arc::clone(&value));
                    inner.state = SlotState::Ready(value);
                }
                Err(error) if error.is_cancelled() => return,
                Err(error) => {
                    // An error view never shows stale data next to it.
                    inner.last_good = None;
                    inner.state = SlotState::Failed(error);
                }
            }
            inner.cancel = None;
            drop(inner);
            let _ = changed_tx.send(generation);
        });
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<R>> {
        self.inner.lock().expect("query slot lock poisoned")
    }
}

impl<R> Drop for QuerySlot<R> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock()
            && let Some(cancel) = inner.cancel.take()
        {
            cancel.cancel();
        }
    }
}

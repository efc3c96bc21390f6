//! Fetch orchestration on top of the cache store.
//!
//! `QueryClient` owns the only path from a hook to the network. Per key it
//! keeps at most one request in flight, retries failures the classifier deems
//! transient, and writes every state transition into the store. Each dispatch
//! gets a generation number; results from a superseded generation are dropped.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::storage::{CacheStorage, MemoryStorage};
use super::traits::{CacheEntry, CacheKey, Cacheable, KeyPart, RawEntry};
use crate::policy::retry::{self, Backoff, ErrorClass, RetryDecision};
use crate::portal::ApiError;

/// Turns a terminal error into a substitute result instead of an error state.
pub type RecoverFn<T> = Arc<dyn Fn(&ApiError) -> Option<T> + Send + Sync>;

/// Per-query behavior knobs.
pub struct QueryOptions<T> {
  /// How long a successful result is served without refetching
  pub stale_time: Duration,
  pub recover: Option<RecoverFn<T>>,
}

impl<T> QueryOptions<T> {
  #[allow(dead_code)]
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Consulted before the retry classifier; a `Some` settles the fetch as a
  /// success and records the original error as suppressed.
  pub fn recover_with<F>(mut self, f: F) -> Self
  where
    F: Fn(&ApiError) -> Option<T> + Send + Sync + 'static,
  {
    self.recover = Some(Arc::new(f));
    self
  }
}

impl<T> Default for QueryOptions<T> {
  fn default() -> Self {
    Self {
      stale_time: Duration::ZERO,
      recover: None,
    }
  }
}

impl<T> Clone for QueryOptions<T> {
  fn clone(&self) -> Self {
    Self {
      stale_time: self.stale_time,
      recover: self.recover.clone(),
    }
  }
}

type SharedFetch = Shared<BoxFuture<'static, RawEntry>>;

struct InFlight {
  generation: u64,
  fetch: SharedFetch,
  abort: AbortHandle,
  /// Waiters still interested in the result
  subscribers: usize,
  /// The entry as it was before this fetch began
  previous: RawEntry,
}

/// One waiter's interest in a pending fetch.
///
/// Dropping it detaches only that waiter. When the last one goes, the fetch is
/// aborted and the entry returns to what it was before the fetch began.
struct Subscription<S: CacheStorage> {
  inner: Arc<Inner<S>>,
  key: CacheKey,
  generation: u64,
}

impl<S: CacheStorage> Drop for Subscription<S> {
  fn drop(&mut self) {
    self.inner.detach(&self.key, self.generation);
  }
}

#[derive(Default)]
struct Registry {
  generations: HashMap<CacheKey, u64>,
  in_flight: HashMap<CacheKey, InFlight>,
}

impl Registry {
  fn next_generation(&mut self, key: &CacheKey) -> u64 {
    let generation = self.generations.entry(key.clone()).or_insert(0);
    *generation += 1;
    *generation
  }

  fn is_current(&self, key: &CacheKey, generation: u64) -> bool {
    self.generations.get(key) == Some(&generation)
  }
}

struct Inner<S> {
  storage: S,
  registry: Mutex<Registry>,
  backoff: Backoff,
}

impl<S: CacheStorage> Inner<S> {
  fn registry(&self) -> MutexGuard<'_, Registry> {
    self.registry.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn current_or_idle(&self, key: &CacheKey) -> RawEntry {
    self
      .storage
      .get(key)
      .unwrap_or_else(|| CacheEntry::idle(key.clone()))
  }

  /// Apply `f` to the entry if `generation` is still the live one for `key`.
  ///
  /// Returns `None` when the generation was superseded and nothing was written.
  fn commit(
    &self,
    key: &CacheKey,
    generation: u64,
    settles: bool,
    f: impl FnOnce(&mut RawEntry),
  ) -> Option<RawEntry> {
    let mut registry = self.registry();
    if !registry.is_current(key, generation) {
      return None;
    }

    let mut f = Some(f);
    let entry = self.storage.update(key, &mut |existing| {
      let mut entry = existing
        .cloned()
        .unwrap_or_else(|| CacheEntry::idle(key.clone()));
      if let Some(f) = f.take() {
        f(&mut entry);
      }
      Some(entry)
    });

    if settles
      && registry
        .in_flight
        .get(key)
        .is_some_and(|f| f.generation == generation)
    {
      registry.in_flight.remove(key);
    }

    entry
  }

  fn detach(&self, key: &CacheKey, generation: u64) {
    let mut registry = self.registry();
    let remaining = match registry.in_flight.get_mut(key) {
      Some(in_flight) if in_flight.generation == generation => {
        in_flight.subscribers = in_flight.subscribers.saturating_sub(1);
        in_flight.subscribers
      }
      _ => return,
    };
    if remaining > 0 {
      return;
    }

    if let Some(in_flight) = registry.in_flight.remove(key) {
      registry.next_generation(key);
      in_flight.abort.abort();
      self
        .storage
        .update(key, &mut |_| Some(in_flight.previous.clone()));
      debug!(key = %key, generation, "no waiters left; abandoned fetch");
    }
  }

  /// Settle the fetch, or report the live entry if this generation was superseded.
  fn settle(&self, key: &CacheKey, generation: u64, f: impl FnOnce(&mut RawEntry)) -> RawEntry {
    match self.commit(key, generation, true, f) {
      Some(entry) => entry,
      None => {
        debug!(key = %key, generation, "discarding result of superseded fetch");
        self.current_or_idle(key)
      }
    }
  }
}

/// Shared fetch orchestrator. Cheap to clone; clones share one store.
pub struct QueryClient<S: CacheStorage = MemoryStorage> {
  inner: Arc<Inner<S>>,
}

impl QueryClient<MemoryStorage> {
  pub fn in_memory(backoff: Backoff) -> Self {
    Self::new(MemoryStorage::new(), backoff)
  }
}

impl<S: CacheStorage + 'static> QueryClient<S> {
  pub fn new(storage: S, backoff: Backoff) -> Self {
    Self {
      inner: Arc::new(Inner {
        storage,
        registry: Mutex::new(Registry::default()),
        backoff,
      }),
    }
  }

  /// Current entry for a key, decoded. Keys never fetched read as idle.
  pub fn entry<T: Cacheable>(&self, key: &CacheKey) -> CacheEntry<T> {
    self.inner.current_or_idle(key).decode()
  }

  #[allow(dead_code)]
  pub fn is_in_flight(&self, key: &CacheKey) -> bool {
    self.inner.registry().in_flight.contains_key(key)
  }

  /// Fetch `key` unless a fresh result is cached.
  ///
  /// With `enabled == false` nothing is dispatched: any pending fetch for the
  /// key is cancelled and the entry reads as idle.
  pub async fn run<T, F, Fut>(
    &self,
    key: &CacheKey,
    enabled: bool,
    options: &QueryOptions<T>,
    fetcher: F,
  ) -> CacheEntry<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    if !enabled {
      self.cancel(key);
      return self.entry(key);
    }

    if let Some(entry) = self.inner.storage.get(key) {
      if is_fresh(&entry, options.stale_time) {
        debug!(key = %key, "serving fresh cached result");
        return entry.decode();
      }
    }

    let (fetch, _subscription) = self.dispatch(key, options, fetcher);
    fetch.await.decode()
  }

  /// Fetch `key` regardless of staleness. Still attaches to a pending request.
  pub async fn refetch<T, F, Fut>(
    &self,
    key: &CacheKey,
    options: &QueryOptions<T>,
    fetcher: F,
  ) -> CacheEntry<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (fetch, _subscription) = self.dispatch(key, options, fetcher);
    fetch.await.decode()
  }

  /// Cancel any pending fetch for `key` and return its entry to idle.
  ///
  /// This is the gate-off path: every waiter on the key is cut loose and a
  /// response that arrives for the cancelled generation is discarded. A
  /// single consumer moving to another key just drops its subscription.
  pub fn cancel(&self, key: &CacheKey) {
    let mut registry = self.inner.registry();
    registry.next_generation(key);

    if let Some(in_flight) = registry.in_flight.remove(key) {
      in_flight.abort.abort();
      info!(key = %key, "cancelled pending fetch");
    }

    self
      .inner
      .storage
      .update(key, &mut |existing| existing.map(|_| CacheEntry::idle(key.clone())));
  }

  /// Mark every entry under `prefix` as needing a refetch.
  pub fn invalidate(&self, prefix: &[KeyPart]) -> Vec<CacheKey> {
    let keys = self.inner.storage.keys_matching(prefix);
    for key in &keys {
      self.inner.storage.update(key, &mut |existing| {
        existing.cloned().map(|mut entry| {
          entry.invalidated = true;
          entry
        })
      });
    }
    debug!(count = keys.len(), "invalidated cache entries");
    keys
  }

  fn dispatch<T, F, Fut>(
    &self,
    key: &CacheKey,
    options: &QueryOptions<T>,
    fetcher: F,
  ) -> (SharedFetch, Subscription<S>)
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let mut registry = self.inner.registry();
    if let Some(in_flight) = registry.in_flight.get_mut(key) {
      debug!(key = %key, "attaching to pending fetch");
      in_flight.subscribers += 1;
      let subscription = self.subscribe(key, in_flight.generation);
      return (in_flight.fetch.clone(), subscription);
    }

    let generation = registry.next_generation(key);
    let mut previous = None;
    self.inner.storage.update(key, &mut |existing| {
      let before = existing
        .cloned()
        .unwrap_or_else(|| CacheEntry::idle(key.clone()));
      let mut entry = before.clone();
      entry.begin();
      previous = Some(before);
      Some(entry)
    });

    let task = tokio::spawn(drive(
      Arc::clone(&self.inner),
      key.clone(),
      generation,
      options.clone(),
      fetcher,
    ));
    let abort = task.abort_handle();

    let inner = Arc::clone(&self.inner);
    let task_key = key.clone();
    let fetch = async move {
      match task.await {
        Ok(entry) => entry,
        // Aborted by a cancel; report whatever the store holds now
        Err(_) => inner.current_or_idle(&task_key),
      }
    }
    .boxed()
    .shared();

    registry.in_flight.insert(
      key.clone(),
      InFlight {
        generation,
        fetch: fetch.clone(),
        abort,
        subscribers: 1,
        previous: previous.unwrap_or_else(|| CacheEntry::idle(key.clone())),
      },
    );

    (fetch, self.subscribe(key, generation))
  }

  fn subscribe(&self, key: &CacheKey, generation: u64) -> Subscription<S> {
    Subscription {
      inner: Arc::clone(&self.inner),
      key: key.clone(),
      generation,
    }
  }
}

impl<S: CacheStorage> Clone for QueryClient<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

fn is_fresh(entry: &RawEntry, stale_time: Duration) -> bool {
  if !entry.is_success() || entry.invalidated || stale_time.is_zero() {
    return false;
  }
  let Ok(stale_time) = chrono::Duration::from_std(stale_time) else {
    return true;
  };
  entry
    .last_updated_at
    .is_some_and(|at| chrono::Utc::now() - at < stale_time)
}

/// Run attempts for one generation of a key until it settles.
async fn drive<S, T, F, Fut>(
  inner: Arc<Inner<S>>,
  key: CacheKey,
  generation: u64,
  options: QueryOptions<T>,
  fetcher: F,
) -> RawEntry
where
  S: CacheStorage,
  T: Cacheable,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  let mut attempt_count = 0;

  loop {
    attempt_count += 1;
    let started = inner.commit(&key, generation, false, |entry| {
      entry.attempt_count = attempt_count;
    });
    if started.is_none() {
      return inner.current_or_idle(&key);
    }

    info!(key = %key, attempt = attempt_count, "fetching");

    let error = match fetcher().await {
      Ok(data) => {
        return match serde_json::to_value(data) {
          Ok(value) => inner.settle(&key, generation, |entry| entry.succeed(value, None)),
          Err(e) => inner.settle(&key, generation, |entry| {
            entry.fail(ApiError::Decode(e.to_string()))
          }),
        };
      }
      Err(error) => error,
    };

    if let Some(substitute) = options.recover.as_ref().and_then(|recover| recover(&error)) {
      debug!(
        key = %key,
        error = %error,
        suppressed = true,
        "error replaced by substitute result"
      );
      let value = serde_json::to_value(substitute).unwrap_or(Value::Null);
      return inner.settle(&key, generation, |entry| {
        entry.succeed(value, Some(error))
      });
    }

    match retry::classify(&error, attempt_count) {
      RetryDecision::Retry => {
        let delay = inner.backoff.delay(attempt_count);
        debug!(key = %key, attempt = attempt_count, ?delay, error = %error, "retrying");
        tokio::time::sleep(delay).await;
      }
      RetryDecision::Stop => {
        warn!(
          key = %key,
          attempts = attempt_count,
          class = ?ErrorClass::of(&error),
          error = %error,
          "fetch failed"
        );
        return inner.settle(&key, generation, |entry| entry.fail(error));
      }
    }
  }
}

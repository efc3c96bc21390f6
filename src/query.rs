//! Per-consumer query handle over the shared fetch orchestrator.
//!
//! Inspired by TanStack Query, a `Query<T>` binds one cache key, its fetcher,
//! and its enabled flag. It owns no data of its own: fetches go through the
//! shared `QueryClient`, so two handles on the same key share one request and
//! one cache entry.
//!
//! # Example
//!
//! ```ignore
//! let api = portal.clone();
//! let mut query = Query::new(client.clone(), CacheKey::new("journey"), move || {
//!     let api = api.clone();
//!     async move { api.journey().await }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//!
//! // In render
//! match query.state().status {
//!     QueryStatus::Loading => render_spinner(),
//!     QueryStatus::Success => render_data(query.data()),
//!     QueryStatus::Error => render_error(query.error()),
//!     QueryStatus::Idle => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::cache::{CacheEntry, CacheKey, Cacheable, QueryClient, QueryOptions, QueryStatus};
use crate::portal::ApiError;

/// A boxed future that returns a Result<T, ApiError>
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<T> + Send + Sync>;

fn boxed_fetcher<T, F, Fut>(fetcher: F) -> FetcherFn<T>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  Arc::new(move || Box::pin(fetcher()))
}

/// Observable query bound to one cache key.
pub struct Query<T> {
  client: QueryClient,
  key: CacheKey,
  fetcher: FetcherFn<T>,
  options: QueryOptions<T>,
  enabled: bool,
  state: CacheEntry<T>,
  receiver: Option<mpsc::UnboundedReceiver<CacheEntry<T>>>,
  /// Task waiting on the orchestrator for this handle
  task: Option<AbortHandle>,
}

impl<T: Cacheable> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is a closure that returns a future. It is called once per
  /// attempt, so retries re-run it.
  pub fn new<F, Fut>(client: QueryClient, key: CacheKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let state = client.entry(&key);
    Self {
      client,
      key,
      fetcher: boxed_fetcher(fetcher),
      options: QueryOptions::default(),
      enabled: true,
      state,
      receiver: None,
      task: None,
    }
  }

  pub fn with_options(mut self, options: QueryOptions<T>) -> Self {
    self.options = options;
    self
  }

  /// Start disabled or enabled. Disabled queries never dispatch.
  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  #[allow(dead_code)]
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Get the current state of the query.
  #[allow(dead_code)]
  pub fn state(&self) -> &CacheEntry<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data.as_ref()
  }

  #[allow(dead_code)]
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  #[allow(dead_code)]
  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  #[allow(dead_code)]
  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  #[allow(dead_code)]
  pub fn error(&self) -> Option<&ApiError> {
    self.state.error.as_ref()
  }

  #[allow(dead_code)]
  pub fn attempt_count(&self) -> u32 {
    self.state.attempt_count
  }

  /// Start fetching unless already loading or disabled.
  pub fn fetch(&mut self) {
    if !self.enabled || self.receiver.is_some() {
      return;
    }
    self.start(false);
  }

  /// Fetch even when fresh data is cached. Joins a pending request if any.
  pub fn refetch(&mut self) {
    if !self.enabled {
      return;
    }
    self.start(true);
  }

  /// Re-evaluate the gate. Turning off cancels the pending fetch and drops
  /// back to idle; turning on starts a fetch.
  pub fn set_enabled(&mut self, enabled: bool) {
    if enabled == self.enabled {
      return;
    }
    self.enabled = enabled;

    if enabled {
      self.fetch();
    } else {
      self.detach();
      self.client.cancel(&self.key);
      self.state = CacheEntry::idle(self.key.clone());
    }
  }

  /// Switch to a new key (e.g. a new date range).
  ///
  /// This handle stops waiting on the old key. Other handles still attached
  /// to it keep their request and its cached result.
  #[allow(dead_code)]
  pub fn set_key<F, Fut>(&mut self, key: CacheKey, fetcher: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    self.fetcher = boxed_fetcher(fetcher);
    if key == self.key {
      return;
    }

    self.detach();
    self.key = key;
    self.state = self.client.entry(&self.key);
    self.fetch();
  }

  /// Poll for progress of a pending fetch.
  ///
  /// Returns `true` if the state changed (new attempt, data, or error).
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(entry) => {
        self.state = entry;
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => {
        // Surface attempt progress while retries are running
        let live: CacheEntry<T> = self.client.entry(&self.key);
        if live.status == QueryStatus::Loading && live.attempt_count != self.state.attempt_count {
          self.state.attempt_count = live.attempt_count;
          true
        } else {
          false
        }
      }
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = self.client.entry(&self.key);
        self.receiver = None;
        true
      }
    }
  }

  /// Wait for the pending fetch, if any, and return the settled state.
  pub async fn settle(&mut self) -> &CacheEntry<T> {
    if let Some(mut rx) = self.receiver.take() {
      self.state = match rx.recv().await {
        Some(entry) => entry,
        None => self.client.entry(&self.key),
      };
    }
    &self.state
  }

  /// Internal: start the fetch operation
  fn start(&mut self, force: bool) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state.status = QueryStatus::Loading;
    self.state.error = None;

    let client = self.client.clone();
    let key = self.key.clone();
    let options = self.options.clone();
    let fetcher = Arc::clone(&self.fetcher);

    let task = tokio::spawn(async move {
      let fetch = move || fetcher();
      let entry = if force {
        client.refetch(&key, &options, fetch).await
      } else {
        client.run(&key, true, &options, fetch).await
      };
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(entry);
    });
    self.task = Some(task.abort_handle());
  }

  fn detach(&mut self) {
    self.receiver = None;
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("enabled", &self.enabled)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

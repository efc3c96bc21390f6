//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::portal::ApiError;

/// Trait for data that can live in the cache.
///
/// Entries are stored as JSON so a single store can hold every entity type;
/// anything serde can round-trip qualifies.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// One component of a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
  Text(String),
  Int(i64),
  /// An optional parameter that was not given
  Absent,
}

impl std::fmt::Display for KeyPart {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      KeyPart::Text(s) => f.write_str(s),
      KeyPart::Int(n) => write!(f, "{}", n),
      KeyPart::Absent => f.write_str("-"),
    }
  }
}

impl From<&str> for KeyPart {
  fn from(s: &str) -> Self {
    KeyPart::Text(s.to_string())
  }
}

impl From<String> for KeyPart {
  fn from(s: String) -> Self {
    KeyPart::Text(s)
  }
}

impl From<i64> for KeyPart {
  fn from(n: i64) -> Self {
    KeyPart::Int(n)
  }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
  fn from(v: Option<T>) -> Self {
    v.map(Into::into).unwrap_or(KeyPart::Absent)
  }
}

/// Ordered tuple identifying one cache slot: entity type first, then parameters.
///
/// Two keys are equal iff every component is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
  pub fn new(entity: &str) -> Self {
    Self(vec![KeyPart::Text(entity.to_string())])
  }

  /// Append a parameter.
  pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
    self.0.push(part.into());
    self
  }

  #[allow(dead_code)]
  pub fn parts(&self) -> &[KeyPart] {
    &self.0
  }

  #[allow(dead_code)]
  pub fn entity(&self) -> Option<&str> {
    match self.0.first() {
      Some(KeyPart::Text(s)) => Some(s),
      _ => None,
    }
  }

  /// Component-wise prefix test.
  pub fn starts_with(&self, prefix: &[KeyPart]) -> bool {
    self.0.starts_with(prefix)
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
    write!(f, "[{}]", parts.join(", "))
  }
}

/// Lifecycle of a cache entry. Moves idle → loading → success | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  Idle,
  Loading,
  Success,
  Error,
}

/// Result of fetching one key, with its status and bookkeeping.
///
/// Invariants: `Success` carries data and no error; `Error` carries an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub key: CacheKey,
  pub status: QueryStatus,
  pub data: Option<T>,
  pub error: Option<ApiError>,
  /// Attempts made by the current (or last) fetch
  pub attempt_count: u32,
  pub last_updated_at: Option<DateTime<Utc>>,
  /// Error that was replaced by a substitute result instead of being surfaced
  pub suppressed_error: Option<ApiError>,
  /// Set by invalidation; the next run refetches regardless of staleness
  pub invalidated: bool,
}

impl<T> CacheEntry<T> {
  pub fn idle(key: CacheKey) -> Self {
    Self {
      key,
      status: QueryStatus::Idle,
      data: None,
      error: None,
      attempt_count: 0,
      last_updated_at: None,
      suppressed_error: None,
      invalidated: false,
    }
  }

  #[allow(dead_code)]
  pub fn is_idle(&self) -> bool {
    self.status == QueryStatus::Idle
  }

  #[allow(dead_code)]
  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  #[allow(dead_code)]
  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Enter loading for a new fetch. Previous data stays visible meanwhile.
  pub(crate) fn begin(&mut self) {
    self.status = QueryStatus::Loading;
    self.error = None;
    self.attempt_count = 0;
  }

  pub(crate) fn succeed(&mut self, data: T, suppressed_error: Option<ApiError>) {
    self.status = QueryStatus::Success;
    self.data = Some(data);
    self.error = None;
    self.last_updated_at = Some(Utc::now());
    self.suppressed_error = suppressed_error;
    self.invalidated = false;
  }

  pub(crate) fn fail(&mut self, error: ApiError) {
    self.status = QueryStatus::Error;
    self.error = Some(error);
    self.suppressed_error = None;
  }

  fn map_data<U>(self, f: impl FnOnce(T) -> Option<U>) -> CacheEntry<U> {
    CacheEntry {
      key: self.key,
      status: self.status,
      data: self.data.and_then(f),
      error: self.error,
      attempt_count: self.attempt_count,
      last_updated_at: self.last_updated_at,
      suppressed_error: self.suppressed_error,
      invalidated: self.invalidated,
    }
  }
}

/// Entry as held by the store, with its data in JSON form.
pub type RawEntry = CacheEntry<Value>;

impl RawEntry {
  /// Decode the stored data into `T`.
  ///
  /// A payload that no longer decodes turns the entry into an error entry.
  pub fn decode<T: Cacheable>(self) -> CacheEntry<T> {
    let mut decode_error = None;
    let mut entry = self.map_data(|v| match serde_json::from_value::<T>(v) {
      Ok(data) => Some(data),
      Err(e) => {
        decode_error = Some(ApiError::Decode(e.to_string()));
        None
      }
    });
    if let Some(err) = decode_error {
      entry.fail(err);
    }
    entry
  }
}

impl<T: Cacheable> CacheEntry<T> {
  /// Encode the data into the store's JSON form.
  #[allow(dead_code)]
  pub fn encode(self) -> RawEntry {
    self.map_data(|data| serde_json::to_value(data).ok())
  }
}

//! Cache storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheKey, KeyPart, RawEntry};

/// Trait for cache storage backends.
///
/// Every operation is atomic per key: readers never observe a half-written
/// entry.
pub trait CacheStorage: Send + Sync {
  /// Get the entry for a key.
  fn get(&self, key: &CacheKey) -> Option<RawEntry>;

  /// Insert or replace the entry for a key.
  #[allow(dead_code)]
  fn put(&self, key: &CacheKey, entry: RawEntry);

  /// Read-modify-write the entry for a key under a single lock.
  ///
  /// `f` receives `None` when the key has no entry yet; returning `None`
  /// leaves the store untouched.
  fn update(
    &self,
    key: &CacheKey,
    f: &mut dyn FnMut(Option<&RawEntry>) -> Option<RawEntry>,
  ) -> Option<RawEntry>;

  /// All keys whose leading components equal `prefix`.
  fn keys_matching(&self, prefix: &[KeyPart]) -> Vec<CacheKey>;
}

/// Process-wide in-memory store. No eviction: the number of keys per session
/// is bounded by the entity types in use.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<CacheKey, RawEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, RawEntry>> {
    // Entries are replaced whole, so a poisoned map is still consistent
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &CacheKey) -> Option<RawEntry> {
    self.lock().get(key).cloned()
  }

  fn put(&self, key: &CacheKey, entry: RawEntry) {
    self.lock().insert(key.clone(), entry);
  }

  fn update(
    &self,
    key: &CacheKey,
    f: &mut dyn FnMut(Option<&RawEntry>) -> Option<RawEntry>,
  ) -> Option<RawEntry> {
    let mut entries = self.lock();
    let next = f(entries.get(key))?;
    entries.insert(key.clone(), next.clone());
    Some(next)
  }

  fn keys_matching(&self, prefix: &[KeyPart]) -> Vec<CacheKey> {
    let mut keys: Vec<CacheKey> = self
      .lock()
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect();
    keys.sort();
    keys
  }
}

//! Durable record of what the user has dismissed.
//!
//! Each category is persisted as a JSON array of ids under its own key. The
//! set only grows: once an id is recorded it is filtered out of every later
//! list for that category, whatever the server says about it.

use color_eyre::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::warn;

use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DismissalCategory {
  Notification,
  Milestone,
}

impl DismissalCategory {
  /// Key the category is persisted under. Categories never share ids.
  pub fn storage_key(self) -> &'static str {
    match self {
      DismissalCategory::Notification => "dismissedNotifications",
      DismissalCategory::Milestone => "dismissedMilestones",
    }
  }
}

/// String-keyed durable storage.
pub trait KeyValueBackend: Send + Sync {
  fn load(&self, key: &str) -> Result<Option<String>>;

  fn save(&self, key: &str, value: &str) -> Result<()>;
}

impl KeyValueBackend for Database {
  fn load(&self, key: &str) -> Result<Option<String>> {
    self.get_item(key)
  }

  fn save(&self, key: &str, value: &str) -> Result<()> {
    self.set_item(key, value)
  }
}

/// Backend that lives only as long as the process.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBackend {
  items: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryBackend {
  fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    self.items.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[cfg(test)]
impl KeyValueBackend for MemoryBackend {
  fn load(&self, key: &str) -> Result<Option<String>> {
    Ok(self.items().get(key).cloned())
  }

  fn save(&self, key: &str, value: &str) -> Result<()> {
    self.items().insert(key.to_string(), value.to_string());
    Ok(())
  }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for std::sync::Arc<B> {
  fn load(&self, key: &str) -> Result<Option<String>> {
    (**self).load(key)
  }

  fn save(&self, key: &str, value: &str) -> Result<()> {
    (**self).save(key, value)
  }
}

/// Set of dismissed ids per category.
pub trait DismissalStore: Send + Sync {
  fn is_dismissed(&self, category: DismissalCategory, id: i64) -> bool;

  /// Record a dismissal. Returns `false` if the id was already recorded.
  fn record_dismissal(&self, category: DismissalCategory, id: i64) -> bool;

  fn dismissed(&self, category: DismissalCategory) -> BTreeSet<i64>;
}

/// Drop every item whose id has been dismissed.
pub fn retain_active<T>(
  store: &dyn DismissalStore,
  category: DismissalCategory,
  items: Vec<T>,
  id_of: impl Fn(&T) -> i64,
) -> Vec<T> {
  let dismissed = store.dismissed(category);
  items
    .into_iter()
    .filter(|item| !dismissed.contains(&id_of(item)))
    .collect()
}

/// Write-through dismissal store over a key/value backend.
///
/// Each category is read from the backend on first use. Unreadable or
/// malformed data counts as an empty set.
pub struct Dismissals<B> {
  backend: B,
  sets: Mutex<HashMap<DismissalCategory, BTreeSet<i64>>>,
}

#[cfg(test)]
impl Dismissals<MemoryBackend> {
  pub fn in_memory() -> Self {
    Self::new(MemoryBackend::default())
  }
}

impl<B: KeyValueBackend> Dismissals<B> {
  pub fn new(backend: B) -> Self {
    Self {
      backend,
      sets: Mutex::new(HashMap::new()),
    }
  }

  fn with_set<R>(
    &self,
    category: DismissalCategory,
    f: impl FnOnce(&mut BTreeSet<i64>) -> R,
  ) -> R {
    let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
    let set = sets
      .entry(category)
      .or_insert_with(|| self.hydrate(category));
    f(set)
  }

  fn hydrate(&self, category: DismissalCategory) -> BTreeSet<i64> {
    let key = category.storage_key();
    match self.backend.load(key) {
      Ok(Some(raw)) => parse_ids(&raw).unwrap_or_else(|| {
        warn!(key, "ignoring malformed dismissal record");
        BTreeSet::new()
      }),
      Ok(None) => BTreeSet::new(),
      Err(e) => {
        warn!(key, error = %e, "failed to read dismissal record");
        BTreeSet::new()
      }
    }
  }

  fn persist(&self, category: DismissalCategory, ids: &BTreeSet<i64>) {
    let key = category.storage_key();
    let result = serde_json::to_string(ids)
      .map_err(color_eyre::Report::from)
      .and_then(|raw| self.backend.save(key, &raw));
    if let Err(e) = result {
      // The in-memory set still holds the id for this session
      warn!(key, error = %e, "failed to persist dismissal record");
    }
  }
}

impl<B: KeyValueBackend> DismissalStore for Dismissals<B> {
  fn is_dismissed(&self, category: DismissalCategory, id: i64) -> bool {
    self.with_set(category, |set| set.contains(&id))
  }

  fn record_dismissal(&self, category: DismissalCategory, id: i64) -> bool {
    self.with_set(category, |set| {
      if !set.insert(id) {
        return false;
      }
      self.persist(category, set);
      true
    })
  }

  fn dismissed(&self, category: DismissalCategory) -> BTreeSet<i64> {
    self.with_set(category, |set| set.clone())
  }
}

/// Parse a persisted id array. Non-integer elements are skipped; anything
/// that is not a JSON array yields `None`.
fn parse_ids(raw: &str) -> Option<BTreeSet<i64>> {
  let values: Vec<serde_json::Value> = serde_json::from_str(raw).ok()?;
  Some(values.iter().filter_map(|v| v.as_i64()).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn test_record_is_idempotent() {
    let backend = Arc::new(MemoryBackend::default());
    let store = Dismissals::new(backend.clone());

    assert!(store.record_dismissal(DismissalCategory::Notification, 7));
    let once = backend.load("dismissedNotifications").unwrap();

    assert!(!store.record_dismissal(DismissalCategory::Notification, 7));
    let twice = backend.load("dismissedNotifications").unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.as_deref(), Some("[7]"));
  }

  #[test]
  fn test_categories_do_not_share_ids() {
    let store = Dismissals::in_memory();
    store.record_dismissal(DismissalCategory::Notification, 7);

    assert!(store.is_dismissed(DismissalCategory::Notification, 7));
    assert!(!store.is_dismissed(DismissalCategory::Milestone, 7));
  }

  #[test]
  fn test_dismissals_survive_reload() {
    let backend = Arc::new(MemoryBackend::default());
    Dismissals::new(backend.clone()).record_dismissal(DismissalCategory::Notification, 7);

    let reloaded = Dismissals::new(backend);
    let active = retain_active(
      &reloaded,
      DismissalCategory::Notification,
      vec![5, 7, 9],
      |id| *id,
    );
    assert_eq!(active, vec![5, 9]);
  }

  #[test]
  fn test_malformed_data_reads_as_empty() {
    for raw in ["not json", "{\"a\": 1}", "42", ""] {
      let backend = MemoryBackend::default();
      backend.save("dismissedMilestones", raw).unwrap();

      let store = Dismissals::new(backend);
      assert!(store.dismissed(DismissalCategory::Milestone).is_empty());

      // Recording over corrupt data replaces it with a valid array
      store.record_dismissal(DismissalCategory::Milestone, 3);
      assert!(store.is_dismissed(DismissalCategory::Milestone, 3));
    }
  }

  #[test]
  fn test_non_integer_elements_are_skipped() {
    let backend = MemoryBackend::default();
    backend
      .save("dismissedNotifications", r#"[1, "two", null, 3.5, 4]"#)
      .unwrap();

    let store = Dismissals::new(backend);
    assert_eq!(
      store.dismissed(DismissalCategory::Notification),
      BTreeSet::from([1, 4])
    );
  }

  #[test]
  fn test_sqlite_backed_store_rehydrates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("carelink.db");

    {
      let store = Dismissals::new(Database::open(&path).unwrap());
      store.record_dismissal(DismissalCategory::Notification, 7);
      store.record_dismissal(DismissalCategory::Milestone, 2);
    }

    let store = Dismissals::new(Database::open(&path).unwrap());
    assert!(store.is_dismissed(DismissalCategory::Notification, 7));
    assert!(store.is_dismissed(DismissalCategory::Milestone, 2));
    assert!(!store.is_dismissed(DismissalCategory::Milestone, 7));
  }
}

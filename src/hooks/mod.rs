//! Entity hooks: per-entity configuration of the shared orchestrator.
//!
//! Each hook picks a cache key shape, a gate, and any special handling, then
//! exposes a read-only view (data, loading, error) plus refetch. Hooks watch
//! the auth state and re-evaluate their gates on every `tick`.

pub mod agenda;
pub mod calendar;
pub mod content;
pub mod journey;
pub mod medical_record;
pub mod milestones;
pub mod notifications;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::{CacheEntry, CacheKey, Cacheable, QueryClient, QueryOptions};
use crate::dismissal::DismissalStore;
use crate::policy::Entity;
use crate::portal::{ApiError, AuthHandle, AuthState, PortalApi};
use crate::query::Query;

pub use agenda::AgendaHook;
pub use calendar::CalendarHook;
pub use content::{ContentFilter, ContentHook};
pub use journey::JourneyHook;
pub use medical_record::MedicalRecordHook;
pub use milestones::MilestoneCelebrations;
pub use notifications::{NotificationPoller, ReadMarker};

/// Collaborators every hook is built from. Constructed once per process.
#[derive(Clone)]
pub struct HookContext {
  pub client: QueryClient,
  pub api: Arc<dyn PortalApi>,
  pub auth: AuthHandle,
  pub dismissals: Arc<dyn DismissalStore>,
}

/// A query whose enabled flag follows an entity gate.
pub struct GatedQuery<T> {
  entity: Entity,
  query: Query<T>,
  auth: watch::Receiver<AuthState>,
}

impl<T: Cacheable> GatedQuery<T> {
  pub fn new<F, Fut>(
    ctx: &HookContext,
    entity: Entity,
    key: CacheKey,
    options: QueryOptions<T>,
    fetcher: F,
  ) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let mut auth = ctx.auth.subscribe();
    let enabled = entity.may_fetch(&auth.borrow_and_update());

    let mut query = Query::new(ctx.client.clone(), key, fetcher)
      .with_options(options)
      .enabled(enabled);
    query.fetch();

    Self {
      entity,
      query,
      auth,
    }
  }

  /// Re-check the gate if auth changed, then poll the query.
  ///
  /// Returns `true` if anything visible changed.
  pub fn tick(&mut self) -> bool {
    let mut changed = false;
    if self.auth.has_changed().unwrap_or(false) {
      let enabled = self.entity.may_fetch(&self.auth.borrow_and_update());
      if enabled != self.query.is_enabled() {
        self.query.set_enabled(enabled);
        changed = true;
      }
    }
    self.query.poll() || changed
  }

  /// Wait for the current fetch to finish.
  pub async fn settle(&mut self) -> &CacheEntry<T> {
    self.tick();
    self.query.settle().await
  }

  pub fn refetch(&mut self) {
    self.query.refetch();
  }

  #[allow(dead_code)]
  pub fn state(&self) -> &CacheEntry<T> {
    self.query.state()
  }

  pub fn data(&self) -> Option<&T> {
    self.query.data()
  }

  #[allow(dead_code)]
  pub fn is_loading(&self) -> bool {
    self.query.is_loading()
  }

  #[allow(dead_code)]
  pub fn is_error(&self) -> bool {
    self.query.is_error()
  }

  #[allow(dead_code)]
  pub fn error(&self) -> Option<&ApiError> {
    self.query.error()
  }

  #[allow(dead_code)]
  pub(crate) fn query_mut(&mut self) -> &mut Query<T> {
    &mut self.query
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::dismissal::Dismissals;
  use crate::policy::Backoff;
  use crate::portal::fake::FakePortal;
  use crate::portal::auth::Role;
  use crate::portal::User;

  pub fn context(api: Arc<FakePortal>, auth: AuthState) -> HookContext {
    HookContext {
      client: QueryClient::in_memory(Backoff::none()),
      api,
      auth: AuthHandle::new(auth),
      dismissals: Arc::new(Dismissals::in_memory()),
    }
  }

  pub fn signed_in(id: i64, role: Role, assigned_line_id: Option<i64>) -> AuthState {
    AuthState::signed_in(User {
      id,
      name: None,
      role,
      assigned_line_id,
    })
  }
}

use std::sync::Arc;

use super::{GatedQuery, HookContext};
use crate::cache::{CacheKey, QueryOptions};
use crate::policy::Entity;
use crate::portal::types::AgendaSummary;

pub fn agenda_key() -> CacheKey {
  CacheKey::new("agenda-summary")
}

/// Upcoming appointments and pending tasks for the care line.
pub struct AgendaHook {
  summary: GatedQuery<AgendaSummary>,
}

impl AgendaHook {
  pub fn new(ctx: &HookContext) -> Self {
    let api = Arc::clone(&ctx.api);
    let summary = GatedQuery::new(
      ctx,
      Entity::Agenda,
      agenda_key(),
      QueryOptions::default(),
      move || {
        let api = Arc::clone(&api);
        async move { api.agenda_summary().await }
      },
    );
    Self { summary }
  }

  #[allow(dead_code)]
  pub fn summary(&self) -> &GatedQuery<AgendaSummary> {
    &self.summary
  }

  pub fn summary_mut(&mut self) -> &mut GatedQuery<AgendaSummary> {
    &mut self.summary
  }

  #[allow(dead_code)]
  pub fn tick(&mut self) -> bool {
    self.summary.tick()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hooks::testing::{context, signed_in};
  use crate::portal::fake::{self, FakePortal};
  use crate::portal::auth::Role;
  use crate::portal::ApiError;

  #[tokio::test]
  async fn test_patient_without_care_line_never_fetches() {
    let api = FakePortal::new();
    api.respond(fake::AGENDA, AgendaSummary::default());
    let ctx = context(api.clone(), signed_in(1, Role::Patient, None));

    let mut hook = AgendaHook::new(&ctx);
    let state = hook.summary_mut().settle().await;

    assert!(state.is_idle());
    assert_eq!(api.calls(fake::AGENDA), 0);
  }

  #[tokio::test]
  async fn test_forbidden_is_terminal() {
    let api = FakePortal::new();
    api.fail(fake::AGENDA, ApiError::status(403));
    let ctx = context(api.clone(), signed_in(1, Role::Patient, Some(2)));

    let mut hook = AgendaHook::new(&ctx);
    let state = hook.summary_mut().settle().await;

    assert!(state.is_error());
    assert_eq!(state.attempt_count, 1);
    assert_eq!(api.calls(fake::AGENDA), 1);
  }

  #[tokio::test]
  async fn test_fetches_once_auth_resolves() {
    let api = FakePortal::new();
    api.respond(fake::AGENDA, AgendaSummary::default());
    let ctx = context(api.clone(), crate::portal::AuthState::loading());

    let mut hook = AgendaHook::new(&ctx);
    assert!(hook.summary_mut().settle().await.is_idle());

    ctx.auth.set(signed_in(1, Role::Patient, Some(2)));
    assert!(hook.tick());
    let state = hook.summary_mut().settle().await;

    assert!(state.is_success());
    assert_eq!(api.calls(fake::AGENDA), 1);
  }
}

use std::sync::Arc;
use tracing::info;

use super::{GatedQuery, HookContext};
use crate::cache::{CacheKey, KeyPart, QueryClient, QueryOptions};
use crate::policy::Entity;
use crate::portal::types::{CalendarConnection, CalendarEvent, CalendarSyncResult, DateRange};
use crate::portal::{ApiError, PortalApi};

const EVENTS: &str = "calendar-events";
const CONNECTION: &str = "calendar-connection";

pub fn events_key(range: DateRange) -> CacheKey {
  CacheKey::new(EVENTS)
    .with(range.start.map(|d| d.to_string()))
    .with(range.end.map(|d| d.to_string()))
}

pub fn connection_key() -> CacheKey {
  CacheKey::new(CONNECTION)
}

fn events_fetcher(
  api: Arc<dyn PortalApi>,
  range: DateRange,
) -> impl Fn() -> futures::future::BoxFuture<'static, Result<Vec<CalendarEvent>, ApiError>>
     + Send
     + Sync
     + 'static {
  use futures::FutureExt;
  move || {
    let api = Arc::clone(&api);
    async move { api.calendar_events(range).await }.boxed()
  }
}

/// Calendar events for a date window plus the external calendar link status.
pub struct CalendarHook {
  client: QueryClient,
  api: Arc<dyn PortalApi>,
  range: DateRange,
  events: GatedQuery<Vec<CalendarEvent>>,
  connection: GatedQuery<CalendarConnection>,
}

impl CalendarHook {
  pub fn new(ctx: &HookContext, range: DateRange) -> Self {
    let events = GatedQuery::new(
      ctx,
      Entity::CalendarEvents,
      events_key(range),
      QueryOptions::default(),
      events_fetcher(Arc::clone(&ctx.api), range),
    );

    let api = Arc::clone(&ctx.api);
    let connection = GatedQuery::new(
      ctx,
      Entity::CalendarConnection,
      connection_key(),
      QueryOptions::default(),
      move || {
        let api = Arc::clone(&api);
        async move { api.google_calendar_connected().await }
      },
    );

    Self {
      client: ctx.client.clone(),
      api: Arc::clone(&ctx.api),
      range,
      events,
      connection,
    }
  }

  #[allow(dead_code)]
  pub fn range(&self) -> DateRange {
    self.range
  }

  /// Move to a new date window. This hook stops waiting on the old one.
  #[allow(dead_code)]
  pub fn set_range(&mut self, range: DateRange) {
    if range == self.range {
      return;
    }
    self.range = range;
    self
      .events
      .query_mut()
      .set_key(events_key(range), events_fetcher(Arc::clone(&self.api), range));
  }

  #[allow(dead_code)]
  pub fn events(&self) -> &GatedQuery<Vec<CalendarEvent>> {
    &self.events
  }

  pub fn events_mut(&mut self) -> &mut GatedQuery<Vec<CalendarEvent>> {
    &mut self.events
  }

  #[allow(dead_code)]
  pub fn connection(&self) -> &GatedQuery<CalendarConnection> {
    &self.connection
  }

  pub fn connection_mut(&mut self) -> &mut GatedQuery<CalendarConnection> {
    &mut self.connection
  }

  #[allow(dead_code)]
  pub fn is_connected(&self) -> bool {
    self.connection.data().is_some_and(|c| c.connected)
  }

  /// Pull from the external calendar, then refresh every calendar key.
  pub async fn sync(&mut self) -> Result<CalendarSyncResult, ApiError> {
    let result = self.api.sync_calendar().await?;

    let mut invalidated = self.client.invalidate(&[KeyPart::from(EVENTS)]);
    invalidated.extend(self.client.invalidate(&[KeyPart::from(CONNECTION)]));
    info!(
      synced = result.synced,
      invalidated = invalidated.len(),
      "calendar synced"
    );

    self.events.refetch();
    self.connection.refetch();
    Ok(result)
  }

  #[allow(dead_code)]
  pub fn tick(&mut self) -> bool {
    let events = self.events.tick();
    let connection = self.connection.tick();
    events || connection
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hooks::testing::{context, signed_in};
  use crate::portal::fake::{self, FakePortal};
  use crate::portal::auth::Role;
  use chrono::{NaiveDate, TimeZone, Utc};

  fn event(id: &str) -> CalendarEvent {
    CalendarEvent {
      id: id.to_string(),
      title: "Consult".to_string(),
      start: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
      end: None,
      source: None,
    }
  }

  fn january() -> DateRange {
    DateRange {
      start: NaiveDate::from_ymd_opt(2026, 1, 1),
      end: NaiveDate::from_ymd_opt(2026, 1, 31),
    }
  }

  #[test]
  fn test_events_key_includes_range() {
    let key = events_key(january());
    assert_eq!(key.to_string(), "[calendar-events, 2026-01-01, 2026-01-31]");
    assert_eq!(
      events_key(DateRange::default()).to_string(),
      "[calendar-events, -, -]"
    );
  }

  #[tokio::test]
  async fn test_events_load_without_care_line_but_status_does_not() {
    let api = FakePortal::new();
    api.respond(fake::CALENDAR_EVENTS, vec![event("a")]);
    api.respond(fake::CALENDAR_STATUS, CalendarConnection { connected: true });
    let ctx = context(api.clone(), signed_in(1, Role::Patient, None));

    let mut hook = CalendarHook::new(&ctx, january());
    assert!(hook.events_mut().settle().await.is_success());
    assert!(hook.connection_mut().settle().await.is_idle());
    assert!(!hook.is_connected());
    assert_eq!(api.calls(fake::CALENDAR_STATUS), 0);
  }

  #[tokio::test]
  async fn test_sync_refreshes_calendar_keys() {
    let api = FakePortal::new();
    api.respond(fake::CALENDAR_EVENTS, vec![event("a")]);
    api.respond(fake::CALENDAR_STATUS, CalendarConnection { connected: true });
    api.respond(fake::CALENDAR_SYNC, CalendarSyncResult { synced: 2 });
    let ctx = context(api.clone(), signed_in(1, Role::Patient, Some(3)));

    let mut hook = CalendarHook::new(&ctx, january());
    hook.events_mut().settle().await;
    hook.connection_mut().settle().await;
    assert!(hook.is_connected());

    api.respond(fake::CALENDAR_EVENTS, vec![event("a"), event("b")]);
    let result = hook.sync().await.unwrap();
    assert_eq!(result.synced, 2);

    let events = hook.events_mut().settle().await;
    assert_eq!(events.data.as_ref().map(Vec::len), Some(2));
    hook.connection_mut().settle().await;
    assert_eq!(api.calls(fake::CALENDAR_EVENTS), 2);
    assert_eq!(api.calls(fake::CALENDAR_STATUS), 2);
  }

  #[tokio::test]
  async fn test_sync_error_is_returned() {
    let api = FakePortal::new();
    api.respond(fake::CALENDAR_EVENTS, Vec::<CalendarEvent>::new());
    api.fail(fake::CALENDAR_SYNC, ApiError::status(502));
    let ctx = context(api.clone(), signed_in(1, Role::Patient, Some(3)));

    let mut hook = CalendarHook::new(&ctx, DateRange::default());
    let err = hook.sync().await.unwrap_err();
    assert_eq!(err.status_code(), Some(502));
  }

  #[tokio::test]
  async fn test_changing_range_moves_to_new_key() {
    let api = FakePortal::new();
    api.respond(fake::CALENDAR_EVENTS, vec![event("a")]);
    let ctx = context(api.clone(), signed_in(1, Role::Patient, None));

    let mut hook = CalendarHook::new(&ctx, january());
    hook.events_mut().settle().await;

    let february = DateRange {
      start: NaiveDate::from_ymd_opt(2026, 2, 1),
      end: NaiveDate::from_ymd_opt(2026, 2, 28),
    };
    hook.set_range(february);
    let state = hook.events_mut().settle().await;

    assert_eq!(state.key, events_key(february));
    assert!(state.is_success());
    assert_eq!(api.calls(fake::CALENDAR_EVENTS), 2);
  }
}

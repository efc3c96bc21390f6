//! Scripted in-process `PortalApi` used by the tests.

use crate::portal::auth::User;
use crate::portal::client::PortalApi;
use crate::portal::error::ApiError;
use crate::portal::types::{
  AgendaSummary, CalendarConnection, CalendarEvent, CalendarSyncResult, ContentItem, DateRange,
  JourneyData, MedicalRecord, Notification,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type Scripted = Result<Value, ApiError>;

#[derive(Default)]
struct FakeState {
  queued: HashMap<String, VecDeque<Scripted>>,
  fallback: HashMap<String, Scripted>,
  calls: HashMap<String, usize>,
  holds: HashMap<String, Arc<Semaphore>>,
}

/// Fake portal backend.
///
/// Each operation answers from its queue first, then from its fallback
/// response. Operations can be held so the test decides when they complete.
#[derive(Default)]
pub struct FakePortal {
  state: Mutex<FakeState>,
}

impl FakePortal {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Answer every call to `op` with `value`.
  pub fn respond<T: Serialize>(&self, op: &str, value: T) {
    let value = serde_json::to_value(value).unwrap();
    self.state.lock().unwrap().fallback.insert(op.to_string(), Ok(value));
  }

  /// Fail every call to `op` with `err`.
  pub fn fail(&self, op: &str, err: ApiError) {
    self.state.lock().unwrap().fallback.insert(op.to_string(), Err(err));
  }

  /// Answer the next call to `op` with `result`, ahead of the fallback.
  pub fn enqueue<T: Serialize>(&self, op: &str, result: Result<T, ApiError>) {
    let scripted = result.map(|v| serde_json::to_value(v).unwrap());
    self
      .state
      .lock()
      .unwrap()
      .queued
      .entry(op.to_string())
      .or_default()
      .push_back(scripted);
  }

  pub fn calls(&self, op: &str) -> usize {
    self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
  }

  /// Make calls to `op` wait until `release` is called.
  pub fn hold(&self, op: &str) {
    self
      .state
      .lock()
      .unwrap()
      .holds
      .insert(op.to_string(), Arc::new(Semaphore::new(0)));
  }

  /// Let `n` held calls to `op` proceed.
  pub fn release(&self, op: &str, n: usize) {
    if let Some(sem) = self.state.lock().unwrap().holds.get(op) {
      sem.add_permits(n);
    }
  }

  async fn call<T: DeserializeOwned>(&self, op: &str) -> Result<T, ApiError> {
    let hold = {
      let mut state = self.state.lock().unwrap();
      *state.calls.entry(op.to_string()).or_default() += 1;
      state.holds.get(op).cloned()
    };

    if let Some(sem) = hold {
      sem.acquire().await.unwrap().forget();
    }

    let scripted = {
      let mut state = self.state.lock().unwrap();
      let queued = state.queued.get_mut(op).and_then(|q| q.pop_front());
      queued.or_else(|| state.fallback.get(op).cloned())
    };

    match scripted {
      Some(Ok(value)) => serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string())),
      Some(Err(err)) => Err(err),
      None => Err(ApiError::Decode(format!("no scripted response for {}", op))),
    }
  }
}

pub const CURRENT_USER: &str = "current_user";
pub const AGENDA: &str = "agenda_summary";
pub const CALENDAR_EVENTS: &str = "calendar_events";
pub const CALENDAR_STATUS: &str = "google_calendar_connected";
pub const CALENDAR_SYNC: &str = "sync_calendar";
pub const CONTENT_RECOMMENDED: &str = "content_recommendations";
pub const CONTENT_ALL: &str = "all_content";
pub const CONTENT_SPECIALTY: &str = "content_by_specialty";
pub const CONTENT_CATEGORY: &str = "content_by_category";
pub const JOURNEY: &str = "journey";
pub const MEDICAL_RECORD: &str = "medical_record";
pub const NOTIFICATIONS: &str = "notifications";
pub const MARK_READ: &str = "mark_notification_read";

#[async_trait]
impl PortalApi for FakePortal {
  async fn current_user(&self) -> Result<User, ApiError> {
    self.call(CURRENT_USER).await
  }

  async fn agenda_summary(&self) -> Result<AgendaSummary, ApiError> {
    self.call(AGENDA).await
  }

  async fn calendar_events(&self, _range: DateRange) -> Result<Vec<CalendarEvent>, ApiError> {
    self.call(CALENDAR_EVENTS).await
  }

  async fn google_calendar_connected(&self) -> Result<CalendarConnection, ApiError> {
    self.call(CALENDAR_STATUS).await
  }

  async fn sync_calendar(&self) -> Result<CalendarSyncResult, ApiError> {
    self.call(CALENDAR_SYNC).await
  }

  async fn content_recommendations(&self) -> Result<Vec<ContentItem>, ApiError> {
    self.call(CONTENT_RECOMMENDED).await
  }

  async fn all_content(&self) -> Result<Vec<ContentItem>, ApiError> {
    self.call(CONTENT_ALL).await
  }

  async fn content_by_specialty(&self, _specialty_id: i64) -> Result<Vec<ContentItem>, ApiError> {
    self.call(CONTENT_SPECIALTY).await
  }

  async fn content_by_category(&self, _category: &str) -> Result<Vec<ContentItem>, ApiError> {
    self.call(CONTENT_CATEGORY).await
  }

  async fn journey(&self) -> Result<JourneyData, ApiError> {
    self.call(JOURNEY).await
  }

  async fn medical_record(&self) -> Result<MedicalRecord, ApiError> {
    self.call(MEDICAL_RECORD).await
  }

  async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
    self.call(NOTIFICATIONS).await
  }

  async fn mark_notification_read(&self, _id: i64) -> Result<(), ApiError> {
    self.call::<Value>(MARK_READ).await.map(|_| ())
  }
}

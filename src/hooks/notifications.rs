//! Background polling of the notification list.
//!
//! The poller is active while the user is signed in and stopped otherwise.
//! Every fetched list is filtered through the dismissal store, so a
//! notification the user has seen never comes back even when the server
//! still returns it. The server's read flag is advisory only.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::HookContext;
use crate::cache::{CacheKey, QueryClient, QueryOptions};
use crate::dismissal::{retain_active, DismissalCategory, DismissalStore};
use crate::policy::Entity;
use crate::portal::types::Notification;
use crate::portal::{ApiError, AuthState, PortalApi};

pub fn notifications_key() -> CacheKey {
  CacheKey::new("notifications")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
  Stopped,
  Active,
}

/// Marks notifications as read without running a poller.
///
/// The local dismissal is recorded first. The remote call that follows is
/// best effort, so the server's read flag and the local dismissal may
/// disagree.
#[derive(Clone)]
pub struct ReadMarker {
  api: Arc<dyn PortalApi>,
  dismissals: Arc<dyn DismissalStore>,
}

impl ReadMarker {
  pub fn new(ctx: &HookContext) -> Self {
    Self {
      api: Arc::clone(&ctx.api),
      dismissals: Arc::clone(&ctx.dismissals),
    }
  }

  pub async fn mark_read(&self, id: i64) {
    self.dismiss(id);
    self.notify_server(id).await;
  }

  fn dismiss(&self, id: i64) {
    self
      .dismissals
      .record_dismissal(DismissalCategory::Notification, id);
    debug!(id, "notification dismissed");
  }

  async fn notify_server(&self, id: i64) {
    if let Err(error) = self.api.mark_notification_read(id).await {
      warn!(id, %error, "remote mark-as-read failed; kept local dismissal");
    }
  }
}

/// What the presentation layer sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationsView {
  /// Active (not dismissed) notifications from the last successful fetch
  pub notifications: Vec<Notification>,
  pub loading: bool,
  pub error: Option<ApiError>,
}

struct PollerShared {
  client: QueryClient,
  api: Arc<dyn PortalApi>,
  dismissals: Arc<dyn DismissalStore>,
  view: watch::Sender<NotificationsView>,
}

impl PollerShared {
  async fn poll_once(&self) {
    self.view.send_modify(|v| v.loading = true);

    let api = Arc::clone(&self.api);
    let entry = self
      .client
      .run(
        &notifications_key(),
        true,
        &QueryOptions::default(),
        move || {
          let api = Arc::clone(&api);
          async move { api.notifications().await }
        },
      )
      .await;

    self.view.send_modify(|view| {
      view.loading = false;
      match (entry.data, entry.error) {
        (_, Some(error)) => view.error = Some(error),
        (Some(list), None) => {
          // Filter at apply time so a dismissal made mid-fetch still holds
          view.notifications = retain_active(
            self.dismissals.as_ref(),
            DismissalCategory::Notification,
            list,
            |n| n.id,
          );
          view.error = None;
        }
        (None, None) => {}
      }
    });
  }
}

/// Periodic driver for the notifications entity.
pub struct NotificationPoller {
  shared: Arc<PollerShared>,
  marker: ReadMarker,
  auth: watch::Receiver<AuthState>,
  interval: Duration,
  task: Option<JoinHandle<()>>,
}

impl NotificationPoller {
  /// Create the poller and start it if the user is already signed in.
  pub fn new(ctx: &HookContext, interval: Duration) -> Self {
    let (view, _) = watch::channel(NotificationsView::default());
    let mut poller = Self {
      shared: Arc::new(PollerShared {
        client: ctx.client.clone(),
        api: Arc::clone(&ctx.api),
        dismissals: Arc::clone(&ctx.dismissals),
        view,
      }),
      marker: ReadMarker::new(ctx),
      auth: ctx.auth.subscribe(),
      interval: interval.max(Duration::from_millis(1)),
      task: None,
    };
    let auth = poller.auth.borrow_and_update().clone();
    poller.apply_gate(&auth);
    poller
  }

  pub fn state(&self) -> PollerState {
    if self.task.is_some() {
      PollerState::Active
    } else {
      PollerState::Stopped
    }
  }

  /// Re-evaluate the gate if auth changed.
  pub fn tick(&mut self) -> PollerState {
    if self.auth.has_changed().unwrap_or(false) {
      let auth = self.auth.borrow_and_update().clone();
      self.apply_gate(&auth);
    }
    self.state()
  }

  fn apply_gate(&mut self, auth: &AuthState) {
    let eligible = Entity::Notifications.may_fetch(auth);
    match (self.state(), eligible) {
      (PollerState::Stopped, true) => self.start(),
      (PollerState::Active, false) => self.stop(),
      _ => {}
    }
  }

  fn start(&mut self) {
    let shared = Arc::clone(&self.shared);
    let period = self.interval;
    info!(?period, "notification polling started");

    self.task = Some(tokio::spawn(async move {
      let mut next = Instant::now();
      loop {
        tokio::time::sleep_until(next).await;
        shared.poll_once().await;

        // Ticks that fell due while the fetch was running are dropped
        let now = Instant::now();
        while next <= now {
          next += period;
        }
      }
    }));
  }

  fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
    self.shared.client.cancel(&notifications_key());
    self.shared.view.send_replace(NotificationsView::default());
    info!("notification polling stopped");
  }

  #[allow(dead_code)]
  pub fn notifications(&self) -> Vec<Notification> {
    self.shared.view.borrow().notifications.clone()
  }

  #[allow(dead_code)]
  pub fn loading(&self) -> bool {
    self.shared.view.borrow().loading
  }

  pub fn view(&self) -> NotificationsView {
    self.shared.view.borrow().clone()
  }

  /// Receiver that wakes whenever the exposed list changes.
  pub fn subscribe(&self) -> watch::Receiver<NotificationsView> {
    self.shared.view.subscribe()
  }

  /// Fetch now, outside the regular schedule. No-op while stopped.
  pub async fn refetch(&self) {
    if self.state() == PollerState::Active {
      self.shared.poll_once().await;
    }
  }

  /// Mark a notification as read.
  ///
  /// The id is recorded as dismissed and removed from the exposed list
  /// before the server is told. A failed remote call is only logged.
  pub async fn mark_as_read(&self, id: i64) {
    self.marker.dismiss(id);
    self
      .shared
      .view
      .send_modify(|v| v.notifications.retain(|n| n.id != id));
    self.marker.notify_server(id).await;
  }
}

impl Drop for NotificationPoller {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{CacheEntry, QueryClient, QueryStatus};
use crate::commands::Command;
use crate::config::Config;
use crate::db::Database;
use crate::dismissal::Dismissals;
use crate::event::{Event, EventHandler};
use crate::hooks::notifications::NotificationsView;
use crate::hooks::{
  AgendaHook, CalendarHook, ContentFilter, ContentHook, HookContext, JourneyHook,
  MedicalRecordHook, MilestoneCelebrations, NotificationPoller, ReadMarker,
};
use crate::portal::types::{DateRange, Notification};
use crate::portal::{AuthHandle, AuthState, PortalApi, PortalClient, User};

/// Main application state
pub struct App {
  ctx: HookContext,
  /// How often the notification poller fires
  poll_interval: Duration,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let api: Arc<dyn PortalApi> = Arc::new(PortalClient::new(config)?);
    let db = Database::open(&config.database_path()?)?;

    let ctx = HookContext {
      client: QueryClient::in_memory(config.backoff()),
      api,
      auth: AuthHandle::default(),
      dismissals: Arc::new(Dismissals::new(db)),
    };
    Ok(Self::with_context(ctx, config.notifications_interval()))
  }

  pub fn with_context(ctx: HookContext, poll_interval: Duration) -> Self {
    Self { ctx, poll_interval }
  }

  /// Resolve the signed-in user. Auth stays "loading" until this returns.
  pub async fn sign_in(&self) -> Result<User> {
    match self.ctx.api.current_user().await {
      Ok(user) => {
        info!(user_id = user.id, role = ?user.role, "signed in");
        self.ctx.auth.set(AuthState::signed_in(user.clone()));
        Ok(user)
      }
      Err(e) => {
        self.ctx.auth.set(AuthState::signed_out());
        Err(eyre!("Sign-in failed: {}", e))
      }
    }
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    self.sign_in().await?;

    match command {
      Command::Notifications { watch: true } => self.watch_notifications().await,
      command => {
        let output = self.execute(command).await?;
        println!("{}", output);
        Ok(())
      }
    }
  }

  /// Run a one-shot command and return what to print.
  pub async fn execute(&self, command: Command) -> Result<String> {
    match command {
      Command::Dashboard => Ok(self.dashboard().await),
      Command::Notifications { .. } => Ok(self.notifications().await),
      Command::Read { id } => {
        ReadMarker::new(&self.ctx).mark_read(id).await;
        Ok(format!("Notification {} marked as read", id))
      }
      Command::Milestones => Ok(self.milestones().await),
      Command::Celebrate { id } => {
        MilestoneCelebrations::new(Arc::clone(&self.ctx.dismissals)).close(id);
        Ok(format!("Milestone {} dismissed", id))
      }
      Command::Calendar { start, end, sync } => self.calendar(DateRange { start, end }, sync).await,
      Command::Content(args) => Ok(self.content(args.filter()).await),
    }
  }

  async fn dashboard(&self) -> String {
    let mut agenda = AgendaHook::new(&self.ctx);
    let mut journey = JourneyHook::new(&self.ctx);
    let mut record = MedicalRecordHook::new(&self.ctx);
    let mut content = ContentHook::new(&self.ctx, ContentFilter::Recommended);

    let mut lines = Vec::new();
    lines.push(describe("Agenda", agenda.summary_mut().settle().await, |s| {
      format!("{} upcoming, {} pending tasks", s.upcoming.len(), s.pending_tasks)
    }));
    lines.push(describe("Journey", journey.journey_mut().settle().await, |j| {
      let stage = j.current_stage.as_deref().unwrap_or("-");
      let achieved = j.steps.iter().filter(|s| s.achieved).count();
      format!("stage {}, {}/{} milestones", stage, achieved, j.steps.len())
    }));
    lines.push(describe("Medical record", record.record_mut().settle().await, |r| {
      format!(
        "{} entries, {} consultations, {} medications",
        r.medical_records.len(),
        r.consultations.len(),
        r.medications.len()
      )
    }));
    lines.push(describe("Recommended", content.items_mut().settle().await, |items| {
      format!("{} items", items.len())
    }));
    lines.join("\n")
  }

  async fn notifications(&self) -> String {
    let poller = NotificationPoller::new(&self.ctx, self.poll_interval);
    // Attaches to the poller's first request
    poller.refetch().await;
    render_notifications(&poller.view())
  }

  async fn watch_notifications(&self) -> Result<()> {
    let mut poller = NotificationPoller::new(&self.ctx, self.poll_interval);
    let mut updates = poller.subscribe();
    let mut events = EventHandler::new(Duration::from_millis(250));

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => {
          poller.tick();
          if updates.has_changed().unwrap_or(false) {
            let view = updates.borrow_and_update().clone();
            if !view.loading {
              println!("{}\n", render_notifications(&view));
            }
          }
        }
        Event::Quit => break,
      }
    }
    Ok(())
  }

  async fn milestones(&self) -> String {
    let mut journey = JourneyHook::new(&self.ctx);
    let state = journey.journey_mut().settle().await;
    if let Some(error) = &state.error {
      return format!("Journey unavailable ({})", error);
    }

    let celebrations = MilestoneCelebrations::new(Arc::clone(&self.ctx.dismissals));
    let pending = celebrations.pending(journey.achieved_milestones());
    if pending.is_empty() {
      return "No new milestones".to_string();
    }
    pending
      .iter()
      .map(|m| format!("#{} {}", m.id, m.title))
      .collect::<Vec<_>>()
      .join("\n")
  }

  async fn calendar(&self, range: DateRange, sync: bool) -> Result<String> {
    let mut hook = CalendarHook::new(&self.ctx, range);
    let mut lines = Vec::new();

    if sync {
      let result = hook
        .sync()
        .await
        .map_err(|e| eyre!("Calendar sync failed: {}", e))?;
      lines.push(format!("Synced {} events", result.synced));
    }

    let connected = hook.connection_mut().settle().await.clone();
    lines.push(describe("Google Calendar", &connected, |c| {
      let status = if c.connected { "connected" } else { "not connected" };
      status.to_string()
    }));

    let events = hook.events_mut().settle().await;
    match &events.data {
      Some(events) if !events.is_empty() => {
        for event in events {
          lines.push(format!("{}  {}", event.start.format("%Y-%m-%d %H:%M"), event.title));
        }
      }
      _ => lines.push(describe("Events", events, |_| "none".to_string())),
    }
    Ok(lines.join("\n"))
  }

  async fn content(&self, filter: ContentFilter) -> String {
    let mut hook = ContentHook::new(&self.ctx, filter);
    let state = hook.items_mut().settle().await;
    match &state.data {
      Some(items) if !items.is_empty() => items
        .iter()
        .map(|item| match &item.category {
          Some(category) => format!("#{} {} [{}]", item.id, item.title, category),
          None => format!("#{} {}", item.id, item.title),
        })
        .collect::<Vec<_>>()
        .join("\n"),
      _ => describe("Content", state, |_| "nothing here".to_string()),
    }
  }
}

/// One status line for an entity.
fn describe<T>(label: &str, state: &CacheEntry<T>, summary: impl Fn(&T) -> String) -> String {
  match (&state.status, &state.data, &state.error) {
    (_, _, Some(error)) => format!("{}: unavailable ({})", label, error),
    (QueryStatus::Success, Some(data), None) => format!("{}: {}", label, summary(data)),
    (QueryStatus::Loading, _, _) => format!("{}: loading", label),
    _ => format!("{}: not available for this account", label),
  }
}

fn render_notifications(view: &NotificationsView) -> String {
  let mut lines: Vec<String> = view.notifications.iter().map(render_notification).collect();
  if lines.is_empty() {
    lines.push("No notifications".to_string());
  }
  if let Some(error) = &view.error {
    lines.push(format!("(last refresh failed: {})", error));
  }
  lines.join("\n")
}

fn render_notification(n: &Notification) -> String {
  format!(
    "#{} [{}] {} ({})",
    n.id,
    n.kind,
    n.message,
    n.created_at.format("%Y-%m-%d %H:%M")
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dismissal::DismissalCategory;
  use crate::hooks::testing::context;
  use crate::portal::fake::{self, FakePortal};
  use crate::portal::types::{AgendaSummary, ContentItem, JourneyData, JourneyStep, Milestone};
  use crate::portal::auth::Role;
  use crate::portal::ApiError;

  fn user(role: Role, assigned_line_id: Option<i64>) -> User {
    User {
      id: 42,
      name: Some("Ana".into()),
      role,
      assigned_line_id,
    }
  }

  fn app(api: Arc<FakePortal>) -> (App, HookContext) {
    let ctx = context(api, AuthState::loading());
    (App::with_context(ctx.clone(), Duration::from_secs(15)), ctx)
  }

  #[tokio::test]
  async fn test_sign_in_resolves_auth() {
    let api = FakePortal::new();
    api.respond(fake::CURRENT_USER, user(Role::Patient, Some(3)));
    let (app, ctx) = app(api);

    app.sign_in().await.unwrap();
    assert!(ctx.auth.current().is_authenticated);
    assert_eq!(ctx.auth.current().user_id(), Some(42));
  }

  #[tokio::test]
  async fn test_failed_sign_in_is_signed_out() {
    let api = FakePortal::new();
    api.fail(fake::CURRENT_USER, ApiError::status(401));
    let (app, ctx) = app(api);

    assert!(app.sign_in().await.is_err());
    let auth = ctx.auth.current();
    assert!(!auth.is_authenticated && !auth.loading);
  }

  #[tokio::test]
  async fn test_admin_dashboard() {
    let api = FakePortal::new();
    api.respond(fake::CURRENT_USER, user(Role::Admin, None));
    api.respond(fake::AGENDA, AgendaSummary::default());
    api.respond(fake::JOURNEY, JourneyData::default());
    api.fail(fake::MEDICAL_RECORD, ApiError::status(404));
    api.respond(fake::CONTENT_RECOMMENDED, Vec::<ContentItem>::new());
    let (app, _ctx) = app(api.clone());
    app.sign_in().await.unwrap();

    let output = app.execute(Command::Dashboard).await.unwrap();

    // Admins pass the care-line gate without being enrolled
    assert!(output.contains("Agenda: 0 upcoming, 0 pending tasks"));
    assert!(output.contains("Journey: stage -, 0/0 milestones"));
    assert!(output.contains("Medical record: 0 entries, 0 consultations, 0 medications"));
    assert!(output.contains("Recommended: 0 items"));
    assert_eq!(api.calls(fake::AGENDA), 1);
    assert_eq!(api.calls(fake::JOURNEY), 1);
  }

  #[tokio::test]
  async fn test_celebrate_hides_milestone() {
    let api = FakePortal::new();
    api.respond(fake::CURRENT_USER, user(Role::Patient, Some(3)));
    api.respond(
      fake::JOURNEY,
      JourneyData {
        line_name: None,
        current_stage: None,
        steps: vec![JourneyStep {
          milestone: Milestone {
            id: 8,
            title: "First consultation".into(),
            description: None,
          },
          achieved: true,
        }],
      },
    );
    let (app, ctx) = app(api);
    app.sign_in().await.unwrap();

    let output = app.execute(Command::Milestones).await.unwrap();
    assert_eq!(output, "#8 First consultation");

    app.execute(Command::Celebrate { id: 8 }).await.unwrap();
    assert!(ctx.dismissals.is_dismissed(DismissalCategory::Milestone, 8));
    assert_eq!(
      app.execute(Command::Milestones).await.unwrap(),
      "No new milestones"
    );
  }

  #[tokio::test]
  async fn test_read_dismisses_even_if_remote_fails() {
    let api = FakePortal::new();
    api.respond(fake::CURRENT_USER, user(Role::Patient, None));
    api.fail(fake::MARK_READ, ApiError::network_unreachable("offline"));
    let (app, ctx) = app(api.clone());
    app.sign_in().await.unwrap();

    app.execute(Command::Read { id: 5 }).await.unwrap();
    assert!(ctx.dismissals.is_dismissed(DismissalCategory::Notification, 5));
    assert_eq!(api.calls(fake::MARK_READ), 1);
    assert_eq!(api.calls(fake::NOTIFICATIONS), 0);
  }
}

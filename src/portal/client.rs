use crate::config::Config;
use crate::portal::auth::User;
use crate::portal::error::ApiError;
use crate::portal::types::{
  AgendaSummary, CalendarConnection, CalendarEvent, CalendarSyncResult, ContentItem, DateRange,
  JourneyData, MedicalRecord, Notification,
};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Remote operations the sync layer consumes, one per entity type.
#[async_trait]
pub trait PortalApi: Send + Sync {
  /// Resolve the signed-in user (authentication boundary)
  async fn current_user(&self) -> Result<User, ApiError>;

  async fn agenda_summary(&self) -> Result<AgendaSummary, ApiError>;

  async fn calendar_events(&self, range: DateRange) -> Result<Vec<CalendarEvent>, ApiError>;

  async fn google_calendar_connected(&self) -> Result<CalendarConnection, ApiError>;

  async fn sync_calendar(&self) -> Result<CalendarSyncResult, ApiError>;

  async fn content_recommendations(&self) -> Result<Vec<ContentItem>, ApiError>;

  async fn all_content(&self) -> Result<Vec<ContentItem>, ApiError>;

  async fn content_by_specialty(&self, specialty_id: i64) -> Result<Vec<ContentItem>, ApiError>;

  async fn content_by_category(&self, category: &str) -> Result<Vec<ContentItem>, ApiError>;

  async fn journey(&self) -> Result<JourneyData, ApiError>;

  async fn medical_record(&self) -> Result<MedicalRecord, ApiError>;

  async fn notifications(&self) -> Result<Vec<Notification>, ApiError>;

  async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError>;
}

/// HTTP client for the portal REST API
#[derive(Clone)]
pub struct PortalClient {
  http: reqwest::Client,
  base: Url,
  token: String,
}

impl PortalClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    // A trailing slash keeps the last base segment when joining paths
    let mut base_url = config.api.base_url.clone();
    if !base_url.ends_with('/') {
      base_url.push('/');
    }
    let base = Url::parse(&base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base, token })
  }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Decode(format!("base URL {} cannot hold a path", self.base)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    query: &[(&str, String)],
  ) -> Result<T, ApiError> {
    let url = self.endpoint(segments)?;
    debug!(%url, "GET");

    let response = self
      .http
      .get(url)
      .bearer_auth(&self.token)
      .query(query)
      .send()
      .await?
      .error_for_status()?;

    Ok(response.json::<T>().await?)
  }

  async fn send_empty(&self, method: reqwest::Method, segments: &[&str]) -> Result<(), ApiError> {
    let url = self.endpoint(segments)?;
    debug!(%url, %method, "request");

    self
      .http
      .request(method, url)
      .bearer_auth(&self.token)
      .send()
      .await?
      .error_for_status()?;

    Ok(())
  }
}

#[async_trait]
impl PortalApi for PortalClient {
  async fn current_user(&self) -> Result<User, ApiError> {
    self.get(&["auth", "me"], &[]).await
  }

  async fn agenda_summary(&self) -> Result<AgendaSummary, ApiError> {
    self.get(&["agenda", "summary"], &[]).await
  }

  async fn calendar_events(&self, range: DateRange) -> Result<Vec<CalendarEvent>, ApiError> {
    let mut query = Vec::new();
    if let Some(start) = range.start {
      query.push(("startDate", start.to_string()));
    }
    if let Some(end) = range.end {
      query.push(("endDate", end.to_string()));
    }
    self.get(&["calendar", "events"], &query).await
  }

  async fn google_calendar_connected(&self) -> Result<CalendarConnection, ApiError> {
    self.get(&["calendar", "google", "status"], &[]).await
  }

  async fn sync_calendar(&self) -> Result<CalendarSyncResult, ApiError> {
    let url = self.endpoint(&["calendar", "sync"])?;
    let response = self
      .http
      .post(url)
      .bearer_auth(&self.token)
      .send()
      .await?
      .error_for_status()?;

    Ok(response.json().await?)
  }

  async fn content_recommendations(&self) -> Result<Vec<ContentItem>, ApiError> {
    self.get(&["content", "recommendations"], &[]).await
  }

  async fn all_content(&self) -> Result<Vec<ContentItem>, ApiError> {
    self.get(&["content"], &[]).await
  }

  async fn content_by_specialty(&self, specialty_id: i64) -> Result<Vec<ContentItem>, ApiError> {
    let id = specialty_id.to_string();
    self.get(&["content", "specialty", &id], &[]).await
  }

  async fn content_by_category(&self, category: &str) -> Result<Vec<ContentItem>, ApiError> {
    self.get(&["content", "category", category], &[]).await
  }

  async fn journey(&self) -> Result<JourneyData, ApiError> {
    self.get(&["journey"], &[]).await
  }

  async fn medical_record(&self) -> Result<MedicalRecord, ApiError> {
    self.get(&["medical-record"], &[]).await
  }

  async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
    self.get(&["notifications"], &[]).await
  }

  async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
    let id = id.to_string();
    self
      .send_empty(reqwest::Method::PATCH, &["notifications", &id, "read"])
      .await
  }
}

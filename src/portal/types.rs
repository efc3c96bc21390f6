//! Entities returned by the portal API.
//!
//! Field names follow the API's camelCase JSON; unknown fields are ignored and
//! most collections default to empty so partial payloads still decode.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Agenda
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaSummary {
  #[serde(default)]
  pub upcoming: Vec<AgendaItem>,
  #[serde(default)]
  pub pending_tasks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
  pub id: i64,
  pub title: String,
  pub starts_at: DateTime<Utc>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub professional: Option<String>,
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
  pub id: String,
  pub title: String,
  pub start: DateTime<Utc>,
  #[serde(default)]
  pub end: Option<DateTime<Utc>>,
  #[serde(default)]
  pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConnection {
  pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSyncResult {
  #[serde(default)]
  pub synced: u32,
}

/// Optional date window for calendar queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
}

// ============================================================================
// Content library
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub summary: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub specialty_id: Option<i64>,
  #[serde(default)]
  pub url: Option<String>,
}

// ============================================================================
// Journey
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStep {
  #[serde(flatten)]
  pub milestone: Milestone,
  #[serde(default)]
  pub achieved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyData {
  #[serde(default)]
  pub line_name: Option<String>,
  #[serde(default)]
  pub current_stage: Option<String>,
  #[serde(default)]
  pub steps: Vec<JourneyStep>,
}

impl JourneyData {
  /// Milestones the patient has reached, in journey order.
  pub fn achieved_milestones(&self) -> Vec<Milestone> {
    self
      .steps
      .iter()
      .filter(|s| s.achieved)
      .map(|s| s.milestone.clone())
      .collect()
  }
}

// ============================================================================
// Medical record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalProfile {
  pub id: i64,
  pub user_id: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub blood_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub recorded_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
  pub id: i64,
  pub date: DateTime<Utc>,
  #[serde(default)]
  pub professional: Option<String>,
  #[serde(default)]
  pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub dosage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
  pub profile: MedicalProfile,
  #[serde(default)]
  pub medical_records: Vec<RecordEntry>,
  #[serde(default)]
  pub consultations: Vec<Consultation>,
  #[serde(default)]
  pub medications: Vec<Medication>,
  pub allergies: Option<String>,
  pub additional_observations: Option<String>,
}

impl MedicalRecord {
  /// Structurally valid record with nothing in it, owned by `user_id`.
  pub fn empty_for(user_id: i64) -> Self {
    Self {
      profile: MedicalProfile {
        id: 0,
        user_id,
        blood_type: None,
        birth_date: None,
      },
      medical_records: Vec::new(),
      consultations: Vec::new(),
      medications: Vec::new(),
      allergies: None,
      additional_observations: None,
    }
  }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: i64,
  pub user_id: i64,
  #[serde(rename = "type")]
  pub kind: String,
  pub message: String,
  #[serde(default)]
  pub link_url: Option<String>,
  #[serde(default)]
  pub is_read: bool,
  pub created_at: DateTime<Utc>,
}

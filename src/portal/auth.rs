//! Authentication state consumed by the sync layer.
//!
//! Session management itself lives elsewhere; this module only models what the
//! data hooks need to know: is there a user, is the session still resolving,
//! and which role and care line the user has.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  Admin,
  Patient,
  Professional,
  #[serde(other)]
  Other,
}

/// The signed-in user as returned by `auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: i64,
  #[serde(default)]
  pub name: Option<String>,
  pub role: Role,
  /// Care line the user is enrolled in, if any
  #[serde(default)]
  pub assigned_line_id: Option<i64>,
}

impl User {
  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  pub fn has_care_line(&self) -> bool {
    self.assigned_line_id.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
  pub is_authenticated: bool,
  pub loading: bool,
  pub user: Option<User>,
}

impl AuthState {
  /// Session is still being resolved.
  pub fn loading() -> Self {
    Self {
      is_authenticated: false,
      loading: true,
      user: None,
    }
  }

  pub fn signed_in(user: User) -> Self {
    Self {
      is_authenticated: true,
      loading: false,
      user: Some(user),
    }
  }

  pub fn signed_out() -> Self {
    Self::default()
  }

  pub fn role(&self) -> Option<Role> {
    self.user.as_ref().map(|u| u.role)
  }

  #[allow(dead_code)]
  pub fn user_id(&self) -> Option<i64> {
    self.user.as_ref().map(|u| u.id)
  }
}

/// Shared, observable auth state.
///
/// Hooks hold a receiver and re-evaluate their gates whenever the state changes.
#[derive(Clone)]
pub struct AuthHandle {
  tx: watch::Sender<AuthState>,
}

impl AuthHandle {
  pub fn new(initial: AuthState) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  pub fn current(&self) -> AuthState {
    self.tx.borrow().clone()
  }

  pub fn set(&self, state: AuthState) {
    self.tx.send_replace(state);
  }

  pub fn subscribe(&self) -> watch::Receiver<AuthState> {
    self.tx.subscribe()
  }
}

impl Default for AuthHandle {
  fn default() -> Self {
    Self::new(AuthState::loading())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_role_deserializes_unknown_as_other() {
    let user: User =
      serde_json::from_str(r#"{"id": 5, "role": "NURSE", "assignedLineId": null}"#).unwrap();
    assert_eq!(user.role, Role::Other);
    assert!(!user.has_care_line());
  }

  #[test]
  fn test_handle_broadcasts_changes() {
    let handle = AuthHandle::default();
    let mut rx = handle.subscribe();
    assert!(handle.current().loading);

    handle.set(AuthState::signed_in(User {
      id: 1,
      name: None,
      role: Role::Patient,
      assigned_line_id: Some(3),
    }));

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().user_id(), Some(1));
  }
}

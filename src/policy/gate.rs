//! Gating: may a query for an entity run at all, given the auth state.
//!
//! A closed gate is not an error. The query simply stays idle, which keeps
//! patients without a care line from hammering endpoints that can only 403.

use crate::portal::auth::{AuthState, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
  /// Signed in and the session has resolved
  Authenticated,
  /// Signed in, resolved, and either enrolled in a care line or an admin
  CareLine,
}

impl Gate {
  pub fn allows(self, auth: &AuthState) -> bool {
    let signed_in = auth.is_authenticated && !auth.loading;
    match self {
      Gate::Authenticated => signed_in,
      Gate::CareLine => {
        signed_in
          && auth
            .user
            .as_ref()
            .is_some_and(|u| u.has_care_line() || u.is_admin())
      }
    }
  }
}

/// Entity types the portal synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
  Agenda,
  CalendarEvents,
  CalendarConnection,
  Content,
  Journey,
  MedicalRecord,
  Notifications,
}

impl Entity {
  /// Gate that applies to this entity for a caller with `role`.
  pub fn gate(self, role: Option<Role>) -> Gate {
    match self {
      Entity::Agenda | Entity::CalendarConnection | Entity::Journey => Gate::CareLine,
      Entity::MedicalRecord if role == Some(Role::Admin) => Gate::Authenticated,
      Entity::MedicalRecord => Gate::CareLine,
      Entity::Content | Entity::CalendarEvents | Entity::Notifications => Gate::Authenticated,
    }
  }

  pub fn may_fetch(self, auth: &AuthState) -> bool {
    self.gate(auth.role()).allows(auth)
  }
}

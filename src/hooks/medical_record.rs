use std::sync::Arc;

use super::{GatedQuery, HookContext};
use crate::cache::{CacheKey, QueryOptions};
use crate::policy::Entity;
use crate::portal::types::MedicalRecord;
use crate::portal::{ApiError, AuthState};

pub fn medical_record_key() -> CacheKey {
  CacheKey::new("medical-record")
}

/// Admins have no record of their own; a 404 for them means "empty", not
/// "missing". Returns the empty record to show instead of the error.
pub fn privileged_empty_record(auth: &AuthState, error: &ApiError) -> Option<MedicalRecord> {
  let user = auth.user.as_ref()?;
  (user.is_admin() && error.status_code() == Some(404)).then(|| MedicalRecord::empty_for(user.id))
}

/// The signed-in user's medical record.
pub struct MedicalRecordHook {
  record: GatedQuery<MedicalRecord>,
}

impl MedicalRecordHook {
  pub fn new(ctx: &HookContext) -> Self {
    let auth = ctx.auth.clone();
    let options = QueryOptions::default()
      .recover_with(move |error| privileged_empty_record(&auth.current(), error));

    let api = Arc::clone(&ctx.api);
    let record = GatedQuery::new(
      ctx,
      Entity::MedicalRecord,
      medical_record_key(),
      options,
      move || {
        let api = Arc::clone(&api);
        async move { api.medical_record().await }
      },
    );
    Self { record }
  }

  #[allow(dead_code)]
  pub fn record(&self) -> &GatedQuery<MedicalRecord> {
    &self.record
  }

  pub fn record_mut(&mut self) -> &mut GatedQuery<MedicalRecord> {
    &mut self.record
  }

  #[allow(dead_code)]
  pub fn tick(&mut self) -> bool {
    self.record.tick()
  }
}

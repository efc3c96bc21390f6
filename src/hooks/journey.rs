use std::sync::Arc;

use super::{GatedQuery, HookContext};
use crate::cache::{CacheKey, QueryOptions};
use crate::policy::Entity;
use crate::portal::types::{JourneyData, Milestone};

pub fn journey_key() -> CacheKey {
  CacheKey::new("journey")
}

/// Care-line journey: stages and milestones.
pub struct JourneyHook {
  journey: GatedQuery<JourneyData>,
}

impl JourneyHook {
  pub fn new(ctx: &HookContext) -> Self {
    let api = Arc::clone(&ctx.api);
    let journey = GatedQuery::new(
      ctx,
      Entity::Journey,
      journey_key(),
      QueryOptions::default(),
      move || {
        let api = Arc::clone(&api);
        async move { api.journey().await }
      },
    );
    Self { journey }
  }

  #[allow(dead_code)]
  pub fn journey(&self) -> &GatedQuery<JourneyData> {
    &self.journey
  }

  pub fn journey_mut(&mut self) -> &mut GatedQuery<JourneyData> {
    &mut self.journey
  }

  /// Achieved milestones from the last successful fetch.
  pub fn achieved_milestones(&self) -> Vec<Milestone> {
    self
      .journey
      .data()
      .map(JourneyData::achieved_milestones)
      .unwrap_or_default()
  }

  #[allow(dead_code)]
  pub fn tick(&mut self) -> bool {
    self.journey.tick()
  }
}

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use super::{GatedQuery, HookContext};
use crate::cache::{CacheKey, QueryOptions};
use crate::policy::Entity;
use crate::portal::types::ContentItem;
use crate::portal::{ApiError, PortalApi};

/// Which slice of the content library to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentFilter {
  Recommended,
  All,
  Specialty(i64),
  Category(String),
}

impl ContentFilter {
  pub fn cache_key(&self) -> CacheKey {
    let key = CacheKey::new("content");
    match self {
      ContentFilter::Recommended => key.with("recommendations"),
      ContentFilter::All => key.with("all"),
      ContentFilter::Specialty(id) => key.with("specialty").with(*id),
      ContentFilter::Category(name) => key.with("category").with(name.clone()),
    }
  }

  fn fetcher(
    &self,
    api: Arc<dyn PortalApi>,
  ) -> impl Fn() -> BoxFuture<'static, Result<Vec<ContentItem>, ApiError>> + Send + Sync + 'static
  {
    let filter = self.clone();
    move || {
      let api = Arc::clone(&api);
      let filter = filter.clone();
      async move {
        match filter {
          ContentFilter::Recommended => api.content_recommendations().await,
          ContentFilter::All => api.all_content().await,
          ContentFilter::Specialty(id) => api.content_by_specialty(id).await,
          ContentFilter::Category(name) => api.content_by_category(&name).await,
        }
      }
      .boxed()
    }
  }
}

/// Content library listing. Open to every signed-in user.
pub struct ContentHook {
  api: Arc<dyn PortalApi>,
  filter: ContentFilter,
  items: GatedQuery<Vec<ContentItem>>,
}

impl ContentHook {
  pub fn new(ctx: &HookContext, filter: ContentFilter) -> Self {
    let items = GatedQuery::new(
      ctx,
      Entity::Content,
      filter.cache_key(),
      QueryOptions::default(),
      filter.fetcher(Arc::clone(&ctx.api)),
    );
    Self {
      api: Arc::clone(&ctx.api),
      filter,
      items,
    }
  }

  #[allow(dead_code)]
  pub fn filter(&self) -> &ContentFilter {
    &self.filter
  }

  #[allow(dead_code)]
  pub fn set_filter(&mut self, filter: ContentFilter) {
    if filter == self.filter {
      return;
    }
    let fetcher = filter.fetcher(Arc::clone(&self.api));
    self.items.query_mut().set_key(filter.cache_key(), fetcher);
    self.filter = filter;
  }

  #[allow(dead_code)]
  pub fn items(&self) -> &GatedQuery<Vec<ContentItem>> {
    &self.items
  }

  pub fn items_mut(&mut self) -> &mut GatedQuery<Vec<ContentItem>> {
    &mut self.items
  }

  #[allow(dead_code)]
  pub fn tick(&mut self) -> bool {
    self.items.tick()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hooks::testing::{context, signed_in};
  use crate::portal::fake::{self, FakePortal};
  use crate::portal::auth::Role;
  use crate::portal::AuthState;

  fn item(id: i64) -> ContentItem {
    ContentItem {
      id,
      title: format!("Article {}", id),
      summary: None,
      category: Some("nutrition".to_string()),
      specialty_id: None,
      url: None,
    }
  }

  #[test]
  fn test_keys_are_distinct_per_variant() {
    assert_eq!(
      ContentFilter::Category("nutrition".into()).cache_key().to_string(),
      "[content, category, nutrition]"
    );
    assert_eq!(
      ContentFilter::Specialty(4).cache_key().to_string(),
      "[content, specialty, 4]"
    );
    assert_ne!(
      ContentFilter::Recommended.cache_key(),
      ContentFilter::All.cache_key()
    );
  }

  #[tokio::test]
  async fn test_content_needs_only_authentication() {
    let api = FakePortal::new();
    api.respond(fake::CONTENT_RECOMMENDED, vec![item(1)]);
    let ctx = context(api.clone(), signed_in(1, Role::Patient, None));

    let mut hook = ContentHook::new(&ctx, ContentFilter::Recommended);
    let state = hook.items_mut().settle().await;

    assert!(state.is_success());
    assert_eq!(state.data, Some(vec![item(1)]));
  }

  #[tokio::test]
  async fn test_signed_out_stays_idle() {
    let api = FakePortal::new();
    api.respond(fake::CONTENT_ALL, vec![item(1)]);
    let ctx = context(api.clone(), AuthState::signed_out());

    let mut hook = ContentHook::new(&ctx, ContentFilter::All);
    assert!(hook.items_mut().settle().await.is_idle());
    assert_eq!(api.calls(fake::CONTENT_ALL), 0);
  }

  #[tokio::test]
  async fn test_switching_filter_fetches_new_slice() {
    let api = FakePortal::new();
    api.respond(fake::CONTENT_ALL, vec![item(1), item(2)]);
    api.respond(fake::CONTENT_CATEGORY, vec![item(2)]);
    let ctx = context(api.clone(), signed_in(1, Role::Patient, None));

    let mut hook = ContentHook::new(&ctx, ContentFilter::All);
    hook.items_mut().settle().await;

    hook.set_filter(ContentFilter::Category("nutrition".into()));
    let state = hook.items_mut().settle().await;

    assert_eq!(state.data, Some(vec![item(2)]));
    assert_eq!(api.calls(fake::CONTENT_CATEGORY), 1);
  }
}

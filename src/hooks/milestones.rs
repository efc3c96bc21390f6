//! One-time prompts for achieved journey milestones.

use std::sync::Arc;
use tracing::debug;

use crate::dismissal::{retain_active, DismissalCategory, DismissalStore};
use crate::portal::types::Milestone;

/// "Milestone achieved" prompts, shown at most once per milestone per client.
///
/// Closing or continuing past a prompt dismisses it for good, no matter how
/// often the journey is refetched.
#[derive(Clone)]
pub struct MilestoneCelebrations {
  dismissals: Arc<dyn DismissalStore>,
}

impl MilestoneCelebrations {
  pub fn new(dismissals: Arc<dyn DismissalStore>) -> Self {
    Self { dismissals }
  }

  #[allow(dead_code)]
  pub fn is_dismissed(&self, milestone_id: i64) -> bool {
    self
      .dismissals
      .is_dismissed(DismissalCategory::Milestone, milestone_id)
  }

  /// Achieved milestones whose prompt has not been dismissed yet.
  pub fn pending(&self, achieved: Vec<Milestone>) -> Vec<Milestone> {
    retain_active(
      self.dismissals.as_ref(),
      DismissalCategory::Milestone,
      achieved,
      |m| m.id,
    )
  }

  /// User closed the prompt.
  pub fn close(&self, milestone_id: i64) {
    self.dismiss(milestone_id);
  }

  /// User continued past the prompt.
  #[allow(dead_code)]
  pub fn continue_past(&self, milestone_id: i64) {
    self.dismiss(milestone_id);
  }

  fn dismiss(&self, milestone_id: i64) {
    if self
      .dismissals
      .record_dismissal(DismissalCategory::Milestone, milestone_id)
    {
      debug!(milestone_id, "milestone prompt dismissed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dismissal::{Dismissals, MemoryBackend};

  fn milestone(id: i64) -> Milestone {
    Milestone {
      id,
      title: format!("Milestone {}", id),
      description: None,
    }
  }

  #[test]
  fn test_prompt_shown_once() {
    let celebrations = MilestoneCelebrations::new(Arc::new(Dismissals::in_memory()));
    let achieved = vec![milestone(1), milestone(2)];

    assert_eq!(celebrations.pending(achieved.clone()).len(), 2);

    celebrations.continue_past(1);
    celebrations.close(2);
    celebrations.close(2);

    assert!(celebrations.pending(achieved.clone()).is_empty());
    assert!(celebrations.is_dismissed(1));
  }

  #[test]
  fn test_milestone_dismissal_does_not_hide_notifications() {
    let store = Arc::new(Dismissals::in_memory());
    let celebrations = MilestoneCelebrations::new(store.clone());
    celebrations.close(7);

    assert!(!store.is_dismissed(DismissalCategory::Notification, 7));
  }

  #[test]
  fn test_dismissal_survives_reload() {
    let backend = Arc::new(MemoryBackend::default());
    MilestoneCelebrations::new(Arc::new(Dismissals::new(backend.clone()))).close(3);

    let reloaded = MilestoneCelebrations::new(Arc::new(Dismissals::new(backend)));
    let pending = reloaded.pending(vec![milestone(3), milestone(4)]);
    assert_eq!(pending, vec![milestone(4)]);
  }
}

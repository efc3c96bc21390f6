//! Retry classification for failed fetches.
//!
//! One classifier serves every entity; hooks do not get their own exceptions.

use std::time::Duration;

use crate::portal::ApiError;

/// Ceiling on attempts for a single fetch, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
  Retry,
  Stop,
}

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// 403/404: a standing mismatch (e.g. no care line) that repetition won't fix
  Structural,
  /// 502 or unreachable network: surface the incident right away
  Outage,
  /// Anything else; presumed to clear up on retry
  Transient,
}

impl ErrorClass {
  pub fn of(error: &ApiError) -> Self {
    match error.status_code() {
      Some(403) | Some(404) => ErrorClass::Structural,
      Some(502) => ErrorClass::Outage,
      _ if error.is_network_unreachable() => ErrorClass::Outage,
      _ => ErrorClass::Transient,
    }
  }

  pub fn is_retryable(self) -> bool {
    self == ErrorClass::Transient
  }
}

/// Decide whether to try again after `attempt_count` attempts have failed,
/// the last with `error`.
pub fn classify(error: &ApiError, attempt_count: u32) -> RetryDecision {
  if attempt_count < MAX_ATTEMPTS && ErrorClass::of(error).is_retryable() {
    RetryDecision::Retry
  } else {
    RetryDecision::Stop
  }
}

/// Exponential delay between attempts, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  pub base: Duration,
  pub max: Duration,
}

impl Backoff {
  pub fn new(base: Duration, max: Duration) -> Self {
    Self { base, max }
  }

  /// No waiting between attempts.
  #[cfg(test)]
  pub fn none() -> Self {
    Self::new(Duration::ZERO, Duration::ZERO)
  }

  /// Delay to wait after the `attempt_count`-th failed attempt.
  pub fn delay(&self, attempt_count: u32) -> Duration {
    let exponent = attempt_count.saturating_sub(1).min(16);
    self.base.saturating_mul(1 << exponent).min(self.max)
  }
}

impl Default for Backoff {
  fn default() -> Self {
    Self::new(Duration::from_secs(1), Duration::from_secs(30))
  }
}

//! Errors surfaced by the remote portal API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of transport failure that prevented an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
  /// The host could not be reached at all (DNS, refused connection, offline)
  NetworkUnreachable,
  /// The transport gave up waiting for a response
  Timeout,
  Other,
}

impl std::fmt::Display for TransportKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      TransportKind::NetworkUnreachable => "network unreachable",
      TransportKind::Timeout => "timeout",
      TransportKind::Other => "transport",
    };
    f.write_str(label)
  }
}

/// Error returned by a portal API call.
///
/// Stored inside cache entries and handed to every waiter attached to a
/// request, so it is cheap to clone and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ApiError {
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("{kind} error: {message}")]
  Transport { kind: TransportKind, message: String },

  #[error("invalid response: {0}")]
  Decode(String),
}

impl ApiError {
  #[cfg(test)]
  pub fn status(status: u16) -> Self {
    ApiError::Status {
      status,
      message: default_reason(status).to_string(),
    }
  }

  #[cfg(test)]
  pub fn network_unreachable(message: impl Into<String>) -> Self {
    ApiError::Transport {
      kind: TransportKind::NetworkUnreachable,
      message: message.into(),
    }
  }

  /// HTTP status code, if the server answered.
  pub fn status_code(&self) -> Option<u16> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn transport_kind(&self) -> Option<TransportKind> {
    match self {
      ApiError::Transport { kind, .. } => Some(*kind),
      _ => None,
    }
  }

  pub fn is_network_unreachable(&self) -> bool {
    self.transport_kind() == Some(TransportKind::NetworkUnreachable)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      return ApiError::Status {
        status: status.as_u16(),
        message: err.to_string(),
      };
    }

    let kind = if err.is_connect() {
      TransportKind::NetworkUnreachable
    } else if err.is_timeout() {
      TransportKind::Timeout
    } else if err.is_decode() {
      return ApiError::Decode(err.to_string());
    } else {
      TransportKind::Other
    };

    ApiError::Transport {
      kind,
      message: err.to_string(),
    }
  }
}

#[cfg(test)]
fn default_reason(status: u16) -> &'static str {
  match status {
    400 => "bad request",
    401 => "unauthorized",
    403 => "forbidden",
    404 => "not found",
    500 => "internal server error",
    502 => "bad gateway",
    503 => "service unavailable",
    504 => "gateway timeout",
    _ => "unexpected status",
  }
}

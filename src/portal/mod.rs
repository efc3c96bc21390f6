//! Boundary to the remote portal: REST client, entity types, and the
//! authentication state the hooks are gated on.

pub mod auth;
pub mod client;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use auth::{AuthHandle, AuthState, User};
pub use client::{PortalApi, PortalClient};
pub use error::ApiError;

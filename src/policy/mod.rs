//! Pure decision functions shared by every entity hook.

pub mod gate;
pub mod retry;

pub use gate::Entity;
pub use retry::Backoff;

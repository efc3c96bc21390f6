//! Keyed cache of fetch results and the orchestrator that fills it.
//!
//! This module is portal-agnostic:
//! - Entries are keyed by ordered tuples (entity type, parameters...)
//! - One entry per key, updated in place by every refetch
//! - At most one request in flight per key; late responses from superseded
//!   fetches are discarded
//! - Failures are retried per the shared retry classifier

mod layer;
mod storage;
mod traits;

pub use layer::{QueryClient, QueryOptions};
pub use traits::{CacheEntry, CacheKey, Cacheable, KeyPart, QueryStatus};

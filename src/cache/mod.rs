//! Cache and inverted-index store layer.
//!
//! - **[`store`]**: the [`store::CacheStore`] trait, typed key namespaces,
//!   and health types; the only surface the rest of the crate sees.
//! - **[`memory`]**: process-shared in-memory store with TTL, sets, and a
//!   sorted-set popularity counter.
//! - **[`manager`]**: typed tagged-payload layer, query-shape hashing, and
//!   the degrade-to-no-op disabled mode.

pub mod manager;
pub mod memory;
pub mod store;

pub use manager::{CacheEntry, CacheManager, CachedSearchResults};
pub use store::{CacheHealth, CacheStatus, CacheStore, Namespace};

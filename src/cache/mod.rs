//! Full-page cache for the public index.
//!
//! Rendered responses are stored in an in-process LRU map with a fixed
//! time-to-live. The cache is applied as axum middleware and exposes an
//! explicit `invalidate_all` hook; it is never cleared implicitly by writes,
//! so a cached index may trail new or deleted posts for up to one TTL window.

mod config;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachedResponse, Lookup, PageCache, PageKey};

/// Key prefix of the cached index page.
pub const INDEX_PAGE_PREFIX: &str = "index_page";

//! Rendered page storage with expiry.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Identifies one cached rendering: route prefix, path with query, and the
/// viewer the page was rendered for (`None` for anonymous visitors).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub prefix: &'static str,
    pub path_and_query: String,
    pub viewer: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct Entry {
    response: CachedResponse,
    stored_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
    Expired,
}

pub struct PageCache {
    ttl: Duration,
    entries: RwLock<LruCache<PageKey, Entry>>,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    /// Stale entries are dropped on read and reported as `Lookup::Expired`.
    pub fn get(&self, key: &PageKey) -> (Option<CachedResponse>, Lookup) {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            None => return (None, Lookup::Miss),
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return (Some(entry.response.clone()), Lookup::Hit);
            }
            Some(_) => {}
        }
        entries.pop(key);
        (None, Lookup::Expired)
    }

    /// Returns the key pushed out by the LRU bound, if any.
    pub fn set(&self, key: PageKey, response: CachedResponse) -> Option<PageKey> {
        let entry = Entry {
            response,
            stored_at: Instant::now(),
        };
        rw_write(&self.entries, SOURCE, "set")
            .push(key.clone(), entry)
            .and_then(|(evicted, _)| (evicted != key).then_some(evicted))
    }

    pub fn invalidate_all(&self) {
        rw_write(&self.entries, SOURCE, "invalidate_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

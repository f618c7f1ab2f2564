//! Full-page response cache middleware.
//!
//! Stores `200 OK` responses to `GET` requests under a key built from the
//! route prefix, the path with its query string, and the resolved viewer.
//! Within the TTL window the stored response is replayed without running
//! the handler.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig,
    store::{CachedResponse, Lookup, PageCache, PageKey},
};
use crate::application::auth::Viewer;

/// Largest body the cache will buffer.
const MAX_CACHED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub pages: Arc<PageCache>,
    pub prefix: &'static str,
}

impl CacheState {
    pub fn new(config: CacheConfig, prefix: &'static str) -> Self {
        let pages = Arc::new(PageCache::new(&config));
        Self {
            config,
            pages,
            prefix,
        }
    }

    /// Explicit invalidation hook.
    pub fn invalidate_all(&self) {
        self.pages.invalidate_all();
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let viewer = request
        .extensions()
        .get::<Viewer>()
        .and_then(Viewer::user_id);
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = PageKey {
        prefix: cache.prefix,
        path_and_query,
        viewer,
    };

    match cache.pages.get(&key) {
        (Some(cached), _) => {
            counter!("quillfeed_page_cache_hit_total").increment(1);
            debug!(cache = cache.prefix, outcome = "hit", "serving cached page");
            return build_response(cached);
        }
        (None, lookup) => {
            counter!("quillfeed_page_cache_miss_total").increment(1);
            debug!(
                cache = cache.prefix,
                outcome = if lookup == Lookup::Expired { "expired" } else { "miss" },
                "rendering page"
            );
        }
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let fits = body
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_CACHED_BODY_BYTES as u64);
    if !fits {
        debug!(
            cache = cache.prefix,
            outcome = "skipped",
            "response body too large or unsized; not caching"
        );
        return Response::from_parts(parts, body);
    }

    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                cache = cache.prefix,
                error = %err,
                "failed to buffer response body for caching"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read response body")
                .into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: bytes.clone(),
    };

    if let Some(evicted) = cache.pages.set(key, cached) {
        counter!("quillfeed_page_cache_evict_total").increment(1);
        debug!(
            cache = cache.prefix,
            evicted = %evicted.path_and_query,
            entries = cache.pages.len(),
            "page cache full, evicted oldest entry"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

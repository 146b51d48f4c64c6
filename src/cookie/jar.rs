//! Bounded, concurrent cookie jar.

use dashmap::DashMap;
use http::Uri;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cookie::Cookie;

/// Key identifying one jar entry: a cookie replaces a prior cookie with the
/// same name, domain, and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JarKey {
    name: String,
    domain: String,
    path: String,
}

#[derive(Debug)]
struct JarEntry {
    cookie: Cookie,
    /// Recency tick, bumped on every match; smallest tick is evicted first.
    last_used: u64,
}

/// Thread-safe cookie store with least-recently-used eviction.
///
/// Shared across transports; reads and writes may race freely. Eviction scans
/// the map, which is fine at jar-sized capacities.
#[derive(Debug)]
pub struct CookieJar {
    inner: DashMap<JarKey, JarEntry>,
    tick: AtomicU64,
    capacity: usize,
}

impl CookieJar {
    /// Create a jar holding at most `capacity` cookies.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: DashMap::new(),
            tick: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Store or update a cookie. A max-age of zero removes the entry.
    pub fn store(&self, cookie: Cookie) {
        let key = JarKey {
            name: cookie.name.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
        };

        if cookie.max_age == Some(0) {
            self.inner.remove(&key);
            return;
        }

        let tick = self.next_tick();
        self.inner.insert(key, JarEntry { cookie, last_used: tick });

        while self.inner.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Store every cookie a response carried.
    pub fn store_all(&self, cookies: impl IntoIterator<Item = Cookie>) {
        for cookie in cookies {
            self.store(cookie);
        }
    }

    /// Collect all cookies matching `uri`, refreshing their recency.
    pub fn matching(&self, uri: &Uri) -> Vec<Cookie> {
        let tick = self.next_tick();
        let mut matched = Vec::new();
        for mut entry in self.inner.iter_mut() {
            if entry.cookie.matches(uri) {
                entry.last_used = tick;
                matched.push(entry.cookie.clone());
            }
        }
        matched
    }

    /// Number of stored cookies.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .inner
            .iter()
            .min_by_key(|entry| entry.last_used)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::trace!(name = %key.name, domain = %key.domain, "Evicting cookie");
            self.inner.remove(&key);
        }
    }
}

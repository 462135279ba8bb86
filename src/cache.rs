//! Process-lifetime TTL caches shared by the upstream adapters.
//!
//! Each entry holds an immutable `Arc` snapshot that is replaced wholesale on
//! refresh, so concurrent readers never observe a partial update and the last
//! writer wins. Expired entries are kept around: adapters that degrade to
//! stale data on upstream failure read them back through [`TtlCache::get_stale`].

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic TTL tests.
#[cfg(test)]
pub struct FakeClock {
    now: std::sync::Mutex<Instant>,
}

#[cfg(test)]
impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { now: std::sync::Mutex::new(Instant::now()) })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), ttl, clock }
    }

    /// Value for `key` if it was stored less than `ttl` ago.
    pub fn get_fresh(&self, key: &K) -> Option<Arc<V>> {
        let entry = self.entries.get(key)?;
        if self.clock.now() < entry.expires_at {
            Some(Arc::clone(&entry.value))
        } else {
            None
        }
    }

    /// Value for `key` regardless of age.
    pub fn get_stale(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|e| Arc::clone(&e.value))
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                expires_at: self.clock.now() + self.ttl,
            },
        );
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serve a fresh entry, else run `fetch` and store its result. When the
    /// fetch fails and `serve_stale` is set, an expired entry for the same key
    /// is returned instead of the error.
    pub async fn fetch_through<F, Fut>(&self, key: K, serve_stale: bool, fetch: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = self.get_fresh(&key) {
            return Ok(hit);
        }
        match fetch().await {
            Ok(value) => Ok(self.insert(key, value)),
            Err(e) => match self.get_stale(&key).filter(|_| serve_stale) {
                Some(stale) => {
                    warn!(key = ?key, "Upstream refresh failed, serving stale cache: {e}");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}

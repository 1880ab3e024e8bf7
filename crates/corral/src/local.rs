//! The in-process tier.
//!
//! A [`LocalCache`] sits in front of the remote tier to absorb hot reads and
//! to deduplicate concurrent populations *within* a process: all callers
//! asking for the same key while a load is in flight await the same future
//! and share its result, so a local stampede reaches the remote store (and
//! the distributed lease) exactly once.
//!
//! Entries are short-lived compared to the remote tier; the per-entry
//! deadline bounds how stale a local read can get.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::CacheContents;

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct InMemoryItem<T> {
    /// When to evict this item from the in-memory cache.
    deadline: Instant,
    /// The actual data.
    data: CacheContents<T>,
}

type InMemoryCache<T> = moka::future::Cache<String, InMemoryItem<T>>;

/// A struct implementing [`moka::Expiry`] that uses the [`InMemoryItem`]
/// [`Instant`] as the explicit expiration time.
struct CacheExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed (it is in the past relative to `current_time`), this
/// will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl<T> moka::Expiry<String, InMemoryItem<T>> for CacheExpiration {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &InMemoryItem<T>,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &InMemoryItem<T>,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// The in-process cache tier.
///
/// Internally deduplicates concurrent lookups: only one `compute` per key
/// runs at a time, its result is shared with every waiter.
pub struct LocalCache<T: Clone + Send + Sync + 'static> {
    cache: InMemoryCache<T>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for LocalCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("in-memory items", &self.cache.entry_count())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for LocalCache<T> {
    fn clone(&self) -> Self {
        LocalCache {
            cache: self.cache.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> LocalCache<T> {
    pub fn new(capacity: u64) -> Self {
        let cache = InMemoryCache::builder()
            .max_capacity(capacity)
            .expire_after(CacheExpiration)
            .build();

        LocalCache { cache }
    }

    /// Reads `key` from this tier, falling back to `compute` on a miss.
    ///
    /// The computation is deduplicated between concurrent callers: whoever
    /// arrives while it is in flight awaits the same future, and its result
    /// (success or error) is shared by all of them. The result is kept for
    /// `ttl` before this tier falls through to `compute` again.
    pub async fn read_through<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CacheContents<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(Box::pin(async move {
                let data = compute().await;
                InMemoryItem {
                    deadline: Instant::now() + ttl,
                    data,
                }
            }))
            .await;

        entry.into_value().data
    }

    /// Like [`read_through`](Self::read_through), but this tier neither
    /// serves nor retains resolved entries for the key.
    ///
    /// A resolved entry left behind by a read-through caller is evicted up
    /// front, so the computation always runs; only genuinely in-flight
    /// computations coalesce. The result is invalidated again as soon as it
    /// resolves.
    pub async fn read_remote_only<F, Fut>(&self, key: &str, compute: F) -> CacheContents<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        self.cache.invalidate(key).await;
        let data = self.read_through(key, Duration::ZERO, compute).await;
        self.cache.invalidate(key).await;
        data
    }

    /// Drops a single entry from this tier.
    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drops every entry from this tier.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

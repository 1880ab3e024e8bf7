//! The two-tier facade.
//!
//! A [`TieredCache`] composes the in-process guard ([`LocalCache`]) with the
//! remote orchestrator ([`ReadThroughCache`]): a read first coalesces within
//! the process, then consults the remote replica, and only populates against
//! the authoritative store when both tiers miss.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, JsonCodec};
use crate::config::CacheConfig;
use crate::error::CacheContents;
use crate::local::LocalCache;
use crate::populate::{PopulateStrategy, ReadThroughCache};
use crate::store::RemoteStore;

/// A two-tier cache: an in-process moka tier in front of a remote tier.
pub struct TieredCache<T, C = JsonCodec>
where
    T: Clone + Send + Sync + 'static,
{
    local: LocalCache<T>,
    remote: ReadThroughCache<C>,
    config: CacheConfig,
}

impl<T, C> std::fmt::Debug for TieredCache<T, C>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("local", &self.local)
            .field("config", &self.config)
            .finish()
    }
}

impl<T, C> Clone for TieredCache<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clone,
{
    fn clone(&self) -> Self {
        TieredCache {
            local: self.local.clone(),
            remote: self.remote.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T> TieredCache<T, JsonCodec>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        replica: Arc<dyn RemoteStore>,
        primary: Arc<dyn RemoteStore>,
        config: CacheConfig,
    ) -> Self {
        Self::with_codec(replica, primary, JsonCodec, config)
    }
}

impl<T, C> TieredCache<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Codec,
{
    pub fn with_codec(
        replica: Arc<dyn RemoteStore>,
        primary: Arc<dyn RemoteStore>,
        codec: C,
        config: CacheConfig,
    ) -> Self {
        let local = LocalCache::new(config.local_capacity);
        let remote = ReadThroughCache::with_codec(replica, primary, codec, config.lease.clone());
        TieredCache {
            local,
            remote,
            config,
        }
    }

    /// Reads `key` through both tiers, populating on a miss.
    ///
    /// Equivalent to [`get_with`](Self::get_with) with the default
    /// (pessimistic) strategy.
    pub async fn get<F, Fut>(&self, key: &str, populate: F) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        self.get_with(key, PopulateStrategy::default(), populate)
            .await
    }

    /// Reads `key` through both tiers, populating on a miss with the given
    /// strategy.
    ///
    /// Within this process, concurrent callers for the same key share one
    /// in-flight remote read; across processes, population is coordinated by
    /// the chosen [`PopulateStrategy`]. The result lives in the local tier
    /// for `local_ttl` and in the remote tier for `remote_ttl`.
    pub async fn get_with<F, Fut>(
        &self,
        key: &str,
        strategy: PopulateStrategy,
        populate: F,
    ) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        let remote = &self.remote;
        let remote_ttl = self.config.remote_ttl;
        self.local
            .read_through(key, self.config.local_ttl, move || async move {
                remote.get_with(key, remote_ttl, strategy, populate).await
            })
            .await
    }

    /// Reads `key` without retaining it in the local tier.
    ///
    /// The remote tier is still shared and populated as usual, and
    /// concurrent local callers still coalesce on the in-flight read; only
    /// the local retention is skipped. For callers that want cross-process
    /// sharing but always-fresh local reads.
    pub async fn get_uncached<F, Fut>(&self, key: &str, populate: F) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        let remote = &self.remote;
        let remote_ttl = self.config.remote_ttl;
        self.local
            .read_remote_only(key, move || async move {
                remote.get_or_populate(key, remote_ttl, populate).await
            })
            .await
    }

    /// Drops `key` from the local tier.
    ///
    /// The remote tier is not touched; its entry ages out by TTL.
    pub async fn remove(&self, key: &str) {
        self.local.remove(key).await;
    }

    /// Drops every entry from the local tier.
    pub fn clear(&self) {
        self.local.clear();
    }
}

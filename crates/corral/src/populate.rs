//! The cache-aside / read-through orchestrator for the remote tier.
//!
//! A read goes to the replica handle first; only on a miss does the
//! authoritative handle get involved, via one of two populate strategies:
//!
//! - **Pessimistic** (the default): population is serialized by a
//!   distributed lease, which gives an eventual-progress guarantee — a
//!   contender either observes the populated value or eventually holds the
//!   lease itself.
//! - **Optimistic**: lock-free watch/transaction population that fails fast
//!   with [`CacheError::Conflict`] when another writer commits first. Under
//!   sustained write contention this can fail indefinitely; that is the
//!   deliberate trade-off, preferred only when populate latency is short
//!   and write contention is rare.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, JsonCodec};
use crate::config::LeaseConfig;
use crate::error::{CacheContents, CacheError};
use crate::lock::LeaseLock;
use crate::store::RemoteStore;

/// How a missing entry gets populated, selected at the call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PopulateStrategy {
    /// Serialize population through a distributed lease.
    #[default]
    Pessimistic,
    /// Populate lock-free and fail fast on write conflicts.
    Optimistic,
}

/// The read-through entry point for the remote tier.
///
/// Reads go to a read-replica handle; population happens against the
/// authoritative handle, guarded by the lease lock or by watch/transaction
/// semantics depending on the chosen [`PopulateStrategy`].
#[derive(Clone, Debug)]
pub struct ReadThroughCache<C = JsonCodec> {
    replica: Arc<dyn RemoteStore>,
    primary: Arc<dyn RemoteStore>,
    lock: LeaseLock,
    codec: C,
}

impl ReadThroughCache<JsonCodec> {
    pub fn new(
        replica: Arc<dyn RemoteStore>,
        primary: Arc<dyn RemoteStore>,
        lease: LeaseConfig,
    ) -> Self {
        Self::with_codec(replica, primary, JsonCodec, lease)
    }
}

impl<C: Codec> ReadThroughCache<C> {
    pub fn with_codec(
        replica: Arc<dyn RemoteStore>,
        primary: Arc<dyn RemoteStore>,
        codec: C,
        lease: LeaseConfig,
    ) -> Self {
        let lock = LeaseLock::new(Arc::clone(&primary), lease);
        ReadThroughCache {
            replica,
            primary,
            lock,
            codec,
        }
    }

    /// Reads `key`, populating it under a distributed lease on a miss.
    ///
    /// A replica hit returns immediately: no lease is taken and nothing is
    /// written. On a miss, the authoritative handle is re-read *inside* the
    /// lease — the value may have been populated by a previous holder while
    /// we contended — and only then is `populate` invoked and its result
    /// written through with `ttl`.
    ///
    /// Net effect: at most one `populate` invocation per key per lease
    /// window across all cooperating processes; other contenders block
    /// (bounded by the lease `acquire_timeout`) and then observe the
    /// populated value.
    pub async fn get_or_populate<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        populate: F,
    ) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        if let Some(bytes) = self.read_live(&self.replica, key).await? {
            return self.codec.unmarshal(&bytes);
        }

        tracing::debug!(key, "remote miss, populating under lease");
        self.lock
            .run_under_lease(key, move || async move {
                if let Some(bytes) = self.read_live(&self.primary, key).await? {
                    return self.codec.unmarshal(&bytes);
                }

                let value = populate().await?;
                let bytes = self.codec.marshal(&value)?;
                self.primary.set(key, bytes, ttl).await?;
                Ok(value)
            })
            .await
    }

    /// Reads `key`, populating it lock-free on a miss.
    ///
    /// The key is read with a watch; if another writer changes it (not
    /// merely lets it expire) before the transactional write commits, this
    /// fails with [`CacheError::Conflict`] and performs no internal retry —
    /// the caller decides whether to try again.
    pub async fn get_or_populate_optimistic<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        populate: F,
    ) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        let (existing, version) = self.primary.get_versioned(key).await?;
        if let Some(bytes) = existing.filter(|b| !b.is_empty()) {
            return self.codec.unmarshal(&bytes);
        }

        let value = populate().await?;
        let bytes = self.codec.marshal(&value)?;
        if !self.primary.set_if_version(key, version, bytes, ttl).await? {
            tracing::debug!(key, "optimistic populate lost to a concurrent writer");
            return Err(CacheError::Conflict);
        }
        Ok(value)
    }

    /// Reads `key`, populating it on a miss with the given strategy.
    pub async fn get_with<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        strategy: PopulateStrategy,
        populate: F,
    ) -> CacheContents<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        match strategy {
            PopulateStrategy::Pessimistic => self.get_or_populate(key, ttl, populate).await,
            PopulateStrategy::Optimistic => {
                self.get_or_populate_optimistic(key, ttl, populate).await
            }
        }
    }

    /// Reads a key, treating an empty payload as a miss.
    async fn read_live(
        &self,
        store: &Arc<dyn RemoteStore>,
        key: &str,
    ) -> CacheContents<Option<Vec<u8>>> {
        Ok(store.get(key).await?.filter(|bytes| !bytes.is_empty()))
    }
}

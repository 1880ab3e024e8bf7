//! A single-owner lease over a named resource, backed by the remote store's
//! atomic primitives.
//!
//! The lease entry lives at `lock.<resource>` (namespaced so it can never
//! collide with cached data keys in the same store) and holds an opaque
//! owner token. Only the holder of the matching token may delete or renew
//! the entry; the store enforces this server-side via its atomic
//! check-and-act operations, there is no client-side trust involved.
//!
//! This is a single-instance lease, not a quorum algorithm: it assumes one
//! authoritative store instance (or a consistently routed primary) and does
//! not defend against split-brain during store failover.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::LeaseConfig;
use crate::error::{CacheContents, CacheError, ErrorKind};
use crate::retry::retry_with_backoff;
use crate::store::RemoteStore;
use crate::utils::CancelOnDrop;

/// The key namespace for lease entries.
pub const LOCK_KEY_PREFIX: &str = "lock.";

fn lock_key(resource: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{resource}")
}

/// Generates a fresh owner token: random bytes plus a timestamp, unique per
/// acquisition.
fn owner_token() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}-{}", Uuid::new_v4().simple(), now.as_millis())
}

/// Acquires and runs operations under distributed leases.
#[derive(Clone, Debug)]
pub struct LeaseLock {
    store: Arc<dyn RemoteStore>,
    config: LeaseConfig,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn RemoteStore>, config: LeaseConfig) -> Self {
        LeaseLock { store, config }
    }

    /// Acquires the lease over `resource`, retrying with backoff while it
    /// is held by someone else.
    ///
    /// Contention is the only retried condition; store errors propagate
    /// immediately. If the lease stays contended for the whole
    /// `acquire_timeout` budget this fails with
    /// [`CacheError::AcquireTimedOut`] — the caller's operation never ran,
    /// and retrying the whole call later is safe.
    pub async fn acquire(&self, resource: &str) -> CacheContents<LeaseGuard> {
        let key = lock_key(resource);
        let token = owner_token();
        let ttl = self.config.ttl;

        let store = &self.store;
        let (key_ref, token_ref) = (&key, &token);
        let attempt = || async move {
            if store
                .set_if_absent(key_ref, token_ref.clone().into_bytes(), ttl)
                .await?
            {
                Ok(())
            } else {
                Err(CacheError::LockBusy)
            }
        };

        let acquired = retry_with_backoff(
            self.config.acquire_timeout,
            self.config.retry_base_delay,
            Some(ErrorKind::LockBusy),
            attempt,
        )
        .await;

        match acquired {
            Ok(()) => {
                tracing::trace!(resource, "lease acquired");
                Ok(LeaseGuard {
                    inner: Arc::new(LeaseInner {
                        store: Arc::clone(&self.store),
                        key,
                        token,
                        ttl,
                    }),
                })
            }
            Err(CacheError::RetryBudgetExhausted { source, .. })
                if source.kind() == ErrorKind::LockBusy =>
            {
                Err(CacheError::AcquireTimedOut(self.config.acquire_timeout))
            }
            Err(err) => Err(err),
        }
    }

    /// Runs `populate` under exclusive ownership of `resource`.
    ///
    /// While `populate` runs, a renewal tick extends the lease every
    /// `ttl / 2` to keep it alive. Renewal failures are observed and logged
    /// but never interrupt the populate: this is a best-effort keep-alive,
    /// not a cancellation mechanism. If the populate outlives the lease
    /// anyway, a new owner may start while it is still running — size the
    /// lease TTL generously relative to expected populate latency.
    ///
    /// On the way out, regardless of outcome, the renewal tick is stopped
    /// and the lease released best-effort; a failed release is swallowed
    /// since the lease self-expires via its TTL. The populate's result or
    /// error propagates unchanged.
    pub async fn run_under_lease<T, F, Fut>(&self, resource: &str, populate: F) -> CacheContents<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>>,
    {
        let guard = self.acquire(resource).await?;
        let renewal = guard.spawn_heartbeat();

        let result = populate().await;

        drop(renewal);
        if let Err(err) = guard.release().await {
            // Expected when the lease expired mid-populate and was taken
            // over; it will self-expire either way.
            tracing::debug!(resource, error = %err, "best-effort lease release failed");
        }

        result
    }
}

#[derive(Debug)]
struct LeaseInner {
    store: Arc<dyn RemoteStore>,
    key: String,
    token: String,
    ttl: Duration,
}

/// An acquired lease.
///
/// Dropping the guard does not release the lease; it expires via its TTL
/// unless [`release`](LeaseGuard::release) is called. Clones share the same
/// ownership token.
#[derive(Clone)]
pub struct LeaseGuard {
    inner: Arc<LeaseInner>,
}

impl fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.inner.key)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

impl LeaseGuard {
    /// Releases the lease, deleting the entry only if we still own it.
    ///
    /// Fails with [`CacheError::ReleaseFailed`] if ownership was lost in
    /// the meantime (lease expired and possibly re-acquired). That is
    /// expected under expiry races and leaves the new owner's lease
    /// untouched.
    pub async fn release(self) -> CacheContents<()> {
        let released = self
            .inner
            .store
            .delete_if_equals(&self.inner.key, self.inner.token.as_bytes())
            .await?;
        if released {
            Ok(())
        } else {
            Err(CacheError::ReleaseFailed)
        }
    }

    /// Renews the lease for another `ttl`, only if we still own it.
    pub async fn extend(&self, ttl: Duration) -> CacheContents<()> {
        let extended = self
            .inner
            .store
            .expire_if_equals(&self.inner.key, self.inner.token.as_bytes(), ttl)
            .await?;
        if extended {
            Ok(())
        } else {
            Err(CacheError::ExtendFailed)
        }
    }

    /// Spawns the periodic renewal tick, stopped when the returned handle
    /// is dropped.
    fn spawn_heartbeat(&self) -> CancelOnDrop<()> {
        // tokio panics on a zero interval period, which a zero-ttl lease
        // would otherwise produce.
        let period = (self.inner.ttl / 2).max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let guard = self.clone();
        let handle = tokio::spawn(async move {
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(err) = guard.extend(guard.inner.ttl).await {
                    tracing::warn!(
                        key = %guard.inner.key,
                        error = %err,
                        "failed to renew lease"
                    );
                }
            }
        });
        CancelOnDrop::new(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryStore;

    use super::*;

    fn lease_lock(store: &MemoryStore, ttl: Duration, acquire_timeout: Duration) -> LeaseLock {
        LeaseLock::new(
            Arc::new(store.clone()),
            LeaseConfig {
                ttl,
                acquire_timeout,
                retry_base_delay: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(5), Duration::from_secs(1));

        let guard = lock.acquire("res").await.unwrap();
        assert!(store.get("lock.res").await.unwrap().is_some());

        guard.release().await.unwrap();
        assert!(store.get("lock.res").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_acquire_times_out() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(60), Duration::from_secs(1));

        let _guard = lock.acquire("res").await.unwrap();
        let res = lock.acquire("res").await;
        assert_eq!(
            res.map(|_| ()),
            Err(CacheError::AcquireTimedOut(Duration::from_secs(1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquirable_after_expiry() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_millis(100), Duration::from_secs(1));

        let _guard = lock.acquire("res").await.unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;

        // The first lease has lapsed, a contender gets it within one retry.
        let guard = lock.acquire("res").await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquirable_after_release() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(60), Duration::from_secs(5));

        let guard = lock.acquire("res").await.unwrap();

        let contender = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("res").await.map(|_| ()) })
        };
        // Let the contender hit the busy lease at least once.
        tokio::time::sleep(Duration::from_millis(50)).await;
        guard.release().await.unwrap();

        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_release_with_stolen_lease_fails() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(5), Duration::from_secs(1));

        let guard = lock.acquire("res").await.unwrap();
        // Simulate expiry plus takeover by another owner.
        store
            .set("lock.res", b"interloper".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(guard.release().await, Err(CacheError::ReleaseFailed));
        // The interloper's lease is untouched.
        assert_eq!(
            store.get("lock.res").await.unwrap(),
            Some(b"interloper".to_vec())
        );
    }

    #[tokio::test]
    async fn test_extend_with_stolen_lease_fails() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(5), Duration::from_secs(1));

        let guard = lock.acquire("res").await.unwrap();
        store
            .set("lock.res", b"interloper".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            guard.extend(Duration::from_secs(5)).await,
            Err(CacheError::ExtendFailed)
        );
        assert_eq!(
            store.get("lock.res").await.unwrap(),
            Some(b"interloper".to_vec())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_lease_alive() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(5), Duration::from_secs(1));

        let store2 = store.clone();
        let result = lock
            .run_under_lease("res", || async move {
                // Run well past the initial TTL; the renewal tick must keep
                // the lease held the whole time.
                tokio::time::sleep(Duration::from_secs(12)).await;
                assert!(store2.get("lock.res").await.unwrap().is_some());
                Ok("populated")
            })
            .await;

        assert_eq!(result, Ok("populated"));
        assert!(store.get("lock.res").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lease_does_not_interrupt_populate() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(4), Duration::from_secs(1));

        let store2 = store.clone();
        let result = lock
            .run_under_lease("res", || async move {
                // Someone takes the lease over mid-populate; renewals and
                // the final release now fail, but only get logged.
                store2
                    .set("lock.res", b"interloper".to_vec(), Duration::from_secs(60))
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(7)
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(
            store.get("lock.res").await.unwrap(),
            Some(b"interloper".to_vec())
        );
    }

    #[tokio::test]
    async fn test_populate_error_propagates_after_cleanup() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::from_secs(5), Duration::from_secs(1));

        let result: CacheContents<()> = lock
            .run_under_lease("res", || async {
                Err(CacheError::Populate("backing query failed".into()))
            })
            .await;

        assert_eq!(
            result,
            Err(CacheError::Populate("backing query failed".into()))
        );
        // The lease was released despite the failure.
        assert!(store.get("lock.res").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_lease_does_not_panic() {
        corral_test::setup();
        let store = MemoryStore::new();
        let lock = lease_lock(&store, Duration::ZERO, Duration::from_secs(1));

        // The lease lapses instantly and the final release fails, but the
        // populate still runs to completion and its result comes through.
        let result = lock.run_under_lease("res", || async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_owner_tokens_are_unique() {
        corral_test::setup();
        let calls = AtomicUsize::new(0);
        let mut tokens = std::collections::HashSet::new();
        while calls.fetch_add(1, Ordering::Relaxed) < 64 {
            assert!(tokens.insert(owner_token()));
        }
    }
}

//! A thundering-herd-safe cache-population layer.
//!
//! This crate sits between an expensive backing computation and its callers,
//! in front of a remote key-value store and a small in-process cache. Its job
//! is to make sure that for any given key, at most one populate computation
//! is in flight at a time, within a process and across cooperating processes,
//! while reads of already-cached keys stay fast and coordination-free.
//!
//! It is organized as follows:
//!
//! - The local tier ([`LocalCache`], composed into [`TieredCache`]) is a
//!   bounded moka cache that additionally deduplicates concurrent lookups:
//!   callers racing for the same key within a process await one shared
//!   in-flight computation.
//! - The remote tier ([`ReadThroughCache`]) speaks to the remote store
//!   through the [`RemoteStore`] trait, reading from a replica handle and
//!   populating against the authoritative handle. Cross-process coordination
//!   uses either a distributed lease ([`PopulateStrategy::Pessimistic`], the
//!   default) or watch/transaction semantics
//!   ([`PopulateStrategy::Optimistic`]).
//! - The lease itself ([`LeaseLock`]) is an expiring `lock.<resource>` key
//!   written with an atomic set-if-absent and guarded by a per-acquisition
//!   owner token; a background heartbeat renews it for the duration of a
//!   populate, and acquisition contends with jittered exponential backoff
//!   ([`retry_with_backoff`]) bounded by a total time budget.
//!
//! Values cross the remote tier as bytes via the [`Codec`] trait, JSON by
//! default. Errors are the `Clone`able [`CacheError`] enum; the
//! [`CacheContents`] alias is used pervasively.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use corral::{CacheConfig, MemoryStore, TieredCache};
//!
//! # async fn example() -> corral::CacheContents<()> {
//! let store = Arc::new(MemoryStore::new());
//! let cache: TieredCache<String> =
//!     TieredCache::new(store.clone(), store, CacheConfig::default());
//!
//! let greeting = cache
//!     .get("user.42", || async {
//!         // the expensive computation, runs at most once per key
//!         Ok("hello".to_owned())
//!     })
//!     .await?;
//! assert_eq!(greeting, "hello");
//! # Ok(())
//! # }
//! ```

mod codec;
mod config;
mod error;
mod local;
mod lock;
mod populate;
mod retry;
pub mod store;
mod tiered;
mod utils;


pub use codec::{Codec, JsonCodec};
pub use config::{CacheConfig, LeaseConfig};
pub use error::{CacheContents, CacheError, ErrorKind};
pub use local::LocalCache;
pub use lock::{LOCK_KEY_PREFIX, LeaseGuard, LeaseLock};
pub use populate::{PopulateStrategy, ReadThroughCache};
pub use retry::{DEFAULT_BASE_DELAY, retry_with_backoff};
pub use store::{MemoryStore, RemoteStore};
pub use tiered::TieredCache;

//! The remote store abstraction.
//!
//! The wire protocol and client library of the actual store are not corral's
//! concern; the core only relies on the small set of primitives in
//! [`RemoteStore`]. Two handle roles are distinguished by usage: a replica
//! handle that is only ever read from (and may lag), and an authoritative
//! handle that all writes and lease operations go through.
//!
//! The check-and-act operations ([`delete_if_equals`](RemoteStore::delete_if_equals),
//! [`expire_if_equals`](RemoteStore::expire_if_equals)) must be executed
//! atomically server-side (e.g. as a single script or transaction). A plain
//! get-then-delete is racy between the check and the act and must not be
//! used to implement them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheContents;

mod memory;

pub use memory::MemoryStore;

/// A handle to the shared remote key-value store.
///
/// All values are opaque byte strings; encoding is the codec's concern.
#[async_trait]
pub trait RemoteStore: fmt::Debug + Send + Sync + 'static {
    /// Reads a key. Absent (or expired) keys yield `None`.
    async fn get(&self, key: &str) -> CacheContents<Option<Vec<u8>>>;

    /// Writes a key with a time-to-live, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheContents<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheContents<()>;

    /// Atomically writes a key with a time-to-live, only if it is absent.
    ///
    /// Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration)
    -> CacheContents<bool>;

    /// Atomically deletes a key, only if its current value equals `expected`.
    ///
    /// Returns whether the delete happened.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> CacheContents<bool>;

    /// Atomically resets a key's time-to-live, only if its current value
    /// equals `expected`.
    ///
    /// Returns whether the expiry was reset.
    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> CacheContents<bool>;

    /// Reads a key together with its write version (the "watch").
    ///
    /// The version advances on every write to the key, but *not* on passive
    /// TTL expiry, so an expired-and-gone key conflicts with nobody.
    async fn get_versioned(&self, key: &str) -> CacheContents<(Option<Vec<u8>>, u64)>;

    /// Transactionally writes a key, only if its write version is still
    /// `version` (the "commit").
    ///
    /// Returns whether the write committed; `false` means another writer
    /// touched the key since the watched read.
    async fn set_if_version(
        &self,
        key: &str,
        version: u64,
        value: Vec<u8>,
        ttl: Duration,
    ) -> CacheContents<bool>;
}

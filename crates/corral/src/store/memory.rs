use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::CacheContents;

use super::RemoteStore;

/// An in-process [`RemoteStore`] backend.
///
/// This exists for tests and local development; clones share the same
/// underlying state, so one instance can stand in for a whole store that
/// several simulated processes talk to. Expiry is tracked on
/// [`tokio::time::Instant`], which makes TTL behavior testable under a
/// paused clock.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    entries: HashMap<String, StoredEntry>,
    /// Per-key write counters, retained across entry expiry.
    versions: HashMap<String, u64>,
}

#[derive(Debug)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStoreInner {
    /// Drops the entry for `key` if its TTL has lapsed.
    ///
    /// Passive expiry does not count as a write, so the version counter is
    /// left alone.
    fn prune(&mut self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at <= Instant::now() {
                self.entries.remove(key);
            }
        }
    }

    fn bump_version(&mut self, key: &str) {
        *self.versions.entry(key.to_owned()).or_insert(0) += 1;
    }

    fn insert(&mut self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.bump_version(key);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheContents<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheContents<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheContents<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        if inner.entries.remove(key).is_some() {
            inner.bump_version(key);
        }
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> CacheContents<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        if inner.entries.contains_key(key) {
            return Ok(false);
        }
        inner.insert(key, value, ttl);
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> CacheContents<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        match inner.entries.get(key) {
            Some(entry) if entry.value == expected => {
                inner.entries.remove(key);
                inner.bump_version(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> CacheContents<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        match inner.entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Instant::now() + ttl;
                inner.bump_version(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_versioned(&self, key: &str) -> CacheContents<(Option<Vec<u8>>, u64)> {
        let mut inner = self.inner.lock().unwrap();
        inner.prune(key);
        let value = inner.entries.get(key).map(|e| e.value.clone());
        let version = inner.versions.get(key).copied().unwrap_or(0);
        Ok((value, version))
    }

    async fn set_if_version(
        &self,
        key: &str,
        version: u64,
        value: Vec<u8>,
        ttl: Duration,
    ) -> CacheContents<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.versions.get(key).copied().unwrap_or(0) != version {
            return Ok(false);
        }
        inner.insert(key, value, ttl);
        Ok(true)
    }
}

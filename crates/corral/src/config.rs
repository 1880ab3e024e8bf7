use std::time::Duration;

use serde::Deserialize;

use crate::retry::DEFAULT_BASE_DELAY;

/// Controls the distributed lease used to serialize cross-process population.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// How long an acquired lease lives without renewal.
    ///
    /// Size this generously relative to expected populate latency: if the
    /// populate outlives the lease and renewal fails, a new owner may start
    /// while the old populate is still running.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Total time budget for contending on a lease before giving up with
    /// [`CacheError::AcquireTimedOut`](crate::CacheError::AcquireTimedOut).
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Base delay for the acquisition backoff.
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        LeaseConfig {
            ttl: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            retry_base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Configuration for a [`TieredCache`](crate::TieredCache).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub lease: LeaseConfig,

    /// Time-to-live of populated entries in the remote tier.
    #[serde(with = "humantime_serde")]
    pub remote_ttl: Duration,

    /// Time-to-live of entries in the local tier.
    ///
    /// Typically much shorter than `remote_ttl`, to bound local staleness.
    #[serde(with = "humantime_serde")]
    pub local_ttl: Duration,

    /// Maximum number of entries held in the local tier.
    pub local_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            lease: LeaseConfig::default(),
            remote_ttl: Duration::from_secs(60),
            local_ttl: Duration::from_secs(1),
            local_capacity: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.lease.ttl, Duration::from_secs(5));
        assert_eq!(config.lease.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.lease.retry_base_delay, Duration::from_millis(100));
        assert!(config.local_ttl < config.remote_ttl);
    }

    #[test]
    fn test_humantime_durations() -> anyhow::Result<()> {
        let config: CacheConfig = serde_json::from_str(
            r#"{
                "lease": { "ttl": "2s 500ms", "acquire_timeout": "1m" },
                "remote_ttl": "5m",
                "local_ttl": "250ms"
            }"#,
        )?;

        assert_eq!(config.lease.ttl, Duration::from_millis(2500));
        assert_eq!(config.lease.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.remote_ttl, Duration::from_secs(300));
        assert_eq!(config.local_ttl, Duration::from_millis(250));
        // Unspecified fields fall back to the defaults.
        assert_eq!(config.local_capacity, 10_000);
        Ok(())
    }
}
